//! In-memory store backend
//!
//! Backs the read path in tests, development and benchmarks without any
//! external service. Not suitable for production: everything lives in a map
//! and dies with the process. The fetch contract is the same one a real
//! backend honors, including the prior-chunk rule and blob validation, so
//! the read path exercises identical code paths either way.

use super::{ChunkWriteRequest, StoreBackend};
use crate::chunk::IterGen;
use crate::error::StoreError;
use crate::metrics::{STORE_CHUNK_SIZE_AT_LOAD, STORE_CORRUPT_CHUNKS};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

type Row = BTreeMap<(String, u32), Bytes>;

/// Map-backed [`StoreBackend`] for tests and development.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Row>>,
    fail_persists: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` persist calls fail, to exercise retry paths.
    pub fn fail_next_persists(&self, n: usize) {
        self.fail_persists.store(n, Ordering::SeqCst);
    }

    /// Seed a chunk directly, bypassing the write queues.
    pub fn put(&self, table: &str, key: &str, t0: u32, data: Bytes) {
        let mut tables = self.tables.write();
        tables
            .entry(table.to_string())
            .or_default()
            .insert((key.to_string(), t0), data);
    }

    /// Number of chunks stored in a table.
    pub fn chunk_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.len())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn fetch(
        &self,
        table: &str,
        key: &str,
        from: u32,
        to: u32,
    ) -> Result<Vec<IterGen>, StoreError> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut blobs: Vec<(u32, Bytes)> = Vec::new();
        // the prior chunk: latest t0 at or before `from`; it may contain the
        // first points of the range
        if let Some(((_, t0), data)) = rows
            .range((key.to_string(), 0)..=(key.to_string(), from))
            .next_back()
        {
            blobs.push((*t0, data.clone()));
        }
        if from < u32::MAX {
            for ((_, t0), data) in rows.range((key.to_string(), from + 1)..(key.to_string(), to)) {
                blobs.push((*t0, data.clone()));
            }
        }
        drop(tables);

        let mut itgens = Vec::with_capacity(blobs.len());
        for (t0, data) in blobs {
            STORE_CHUNK_SIZE_AT_LOAD.observe(data.len() as f64);
            match IterGen::new(data, t0) {
                Ok(itgen) => itgens.push(itgen),
                Err(err) => {
                    STORE_CORRUPT_CHUNKS.inc();
                    return Err(err);
                }
            }
        }
        Ok(itgens)
    }

    async fn persist(&self, table: &str, cwr: &ChunkWriteRequest) -> Result<(), StoreError> {
        let pending = self.fail_persists.load(Ordering::SeqCst);
        if pending > 0
            && self
                .fail_persists
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::CorruptChunk("injected persist failure".into()));
        }
        self.put(table, &cwr.key, cwr.t0, cwr.data.clone());
        Ok(())
    }
}
