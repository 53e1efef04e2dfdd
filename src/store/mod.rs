//! Store facade: the durable chunk store as seen by the read path
//!
//! The read path consumes a narrow contract: ascending chunks covering a
//! range (including the prior chunk that contains the range start), and a
//! fire-and-forget write entry point. Everything behind that contract is a
//! [`StoreBackend`] implementation; [`QueuedStore`] wraps any backend with
//! the bounded read queue, worker pool and sharded write queues that keep
//! store latency off the request's critical path.
//!
//! Retention periods map to tables so that similarly-aged data compacts
//! together; the bucketing scheme groups TTLs by their largest power of two
//! in hours.

pub mod memory;
mod queued;

pub use queued::QueuedStore;

use crate::chunk::IterGen;
use crate::error::StoreError;
use crate::types::MetricKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Instant;

/// Seconds per storage row window.
///
/// Chunk spans must divide this evenly so that the prior chunk of any range
/// start is always found in the same row as the start itself.
pub const MONTH_SEC: u32 = 60 * 60 * 24 * 28;

/// Divisor applied to a TTL's power-of-two bucket to derive the table's
/// compaction window.
pub const WINDOW_FACTOR: u32 = 20;

/// A chunk on its way into the store.
#[derive(Debug, Clone)]
pub struct ChunkWriteRequest {
    /// Storage key the chunk belongs to.
    pub key: MetricKey,
    /// Retention period selecting the target table.
    pub ttl: u32,
    /// The chunk's start timestamp.
    pub t0: u32,
    /// Encoded chunk blob.
    pub data: Bytes,
    /// When the request was created, for queue-wait accounting.
    pub enqueued: Instant,
}

impl ChunkWriteRequest {
    /// Create a write request stamped now.
    pub fn new(key: MetricKey, ttl: u32, t0: u32, data: Bytes) -> Self {
        Self {
            key,
            ttl,
            t0,
            data,
            enqueued: Instant::now(),
        }
    }
}

/// The store as the read coordinator sees it.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// Chunks covering `[from, to)` for `key`, ascending by start timestamp,
    /// including the prior chunk whose `ts <= from`.
    async fn search(
        &self,
        key: &str,
        ttl: u32,
        from: u32,
        to: u32,
    ) -> Result<Vec<IterGen>, StoreError>;

    /// Enqueue a chunk write. Waits for queue space but never for the
    /// backend; per-key ordering is preserved.
    async fn add(&self, cwr: ChunkWriteRequest) -> Result<(), StoreError>;

    /// Drain the queues and stop the workers.
    async fn stop(&self);
}

/// A storage backend behind the queues: one table namespace, raw fetch and
/// persist operations, no queueing concerns.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Fetch chunks of `key` from `table` overlapping `[from, to)`,
    /// ascending, including the prior chunk with `ts <= from`.
    async fn fetch(
        &self,
        table: &str,
        key: &str,
        from: u32,
        to: u32,
    ) -> Result<Vec<IterGen>, StoreError>;

    /// Persist one chunk into `table`.
    async fn persist(&self, table: &str, cwr: &ChunkWriteRequest) -> Result<(), StoreError>;
}

/// One retention table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlTable {
    /// Table name, derived from the TTL bucket.
    pub name: String,
    /// Compaction window in hours.
    pub window_size: u32,
}

/// Mapping from configured retention periods to their tables.
#[derive(Debug, Clone, Default)]
pub struct TtlTables {
    tables: HashMap<u32, TtlTable>,
}

impl TtlTables {
    /// Build the mapping for the configured TTLs.
    pub fn new(ttls: &[u32]) -> Self {
        let mut tables = HashMap::new();
        for &ttl in ttls {
            tables.insert(ttl, ttl_table(ttl, WINDOW_FACTOR));
        }
        Self { tables }
    }

    /// Look up the table for a TTL.
    pub fn table(&self, ttl: u32) -> Result<&TtlTable, StoreError> {
        self.tables.get(&ttl).ok_or(StoreError::TableNotFound)
    }

    /// All table names, for schema setup.
    pub fn names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name.clone()).collect()
    }
}

/// Derive the table for one TTL.
///
/// TTLs bucket by the largest power of two (in hours) at or below them, so
/// metrics with similar retention land in the same table and the compaction
/// window can grow with the bucket:
///
/// ```text
///   0 <= hours <  1   metric_0     window  1h
///   1 <= hours <  2   metric_1     window  1h
///   2 <= hours <  4   metric_2     window  1h
///  ...
/// 512 <= hours < 1024 metric_512   window 26h
/// ```
pub fn ttl_table(ttl: u32, window_factor: u32) -> TtlTable {
    let hours = f64::from(ttl) / 3600.0;
    // largest power of 2 at or below the TTL in hours; below one hour this
    // collapses to bucket 0
    let bucket = hours.log2().floor().exp2() as u32;
    TtlTable {
        name: format!("metric_{}", bucket),
        window_size: bucket / window_factor + 1,
    }
}
