//! Queued store wrapper: bounded queues between the read path and a backend
//!
//! Reads are submitted to a bounded queue and answered by a pool of worker
//! tasks; submission never blocks, a full queue is an immediate
//! [`StoreError::ReadQueueFull`]. A read that sat queued past the omit
//! timeout is discarded unexecuted ([`StoreError::ReadTooOld`]) because its
//! requester has long given up.
//!
//! Writes are sharded across one bounded queue per writer by a stable hash
//! of the key, so all chunks of one metric funnel through the same worker
//! and arrive at the backend in order. Workers retry failed persists
//! forever with a capped linear backoff; the write path tolerates a slow
//! backend, never a lossy one.

use super::{ChunkStore, ChunkWriteRequest, StoreBackend, TtlTables};
use crate::chunk::IterGen;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metrics::{
    STORE_CHUNK_SAVE_FAIL, STORE_CHUNK_SAVE_OK, STORE_OMIT_OLD_READ, STORE_READ_EXEC_SECONDS,
    STORE_READ_QUEUE_FULL, STORE_READ_WAIT_SECONDS,
};
use crate::types::MetricKey;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

struct ReadRequest {
    table: String,
    key: MetricKey,
    from: u32,
    to: u32,
    enqueued: Instant,
    reply: oneshot::Sender<Result<Vec<IterGen>, StoreError>>,
}

struct WriteJob {
    table: String,
    cwr: ChunkWriteRequest,
}

/// A [`StoreBackend`] wrapped with read/write queues and worker pools.
pub struct QueuedStore<B: StoreBackend> {
    backend: Arc<B>,
    tables: TtlTables,
    read_tx: parking_lot::Mutex<Option<mpsc::Sender<ReadRequest>>>,
    write_txs: parking_lot::Mutex<Option<Vec<mpsc::Sender<WriteJob>>>>,
}

impl<B: StoreBackend> QueuedStore<B> {
    /// Wrap a backend, spawning the configured reader and writer pools.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(backend: B, config: &StoreConfig) -> Arc<Self> {
        let backend = Arc::new(backend);

        let (read_tx, read_rx) = mpsc::channel::<ReadRequest>(config.read_queue_size);
        let read_rx = Arc::new(Mutex::new(read_rx));
        let omit = Duration::from_secs(config.omit_read_timeout_secs);
        for id in 0..config.num_readers {
            tokio::spawn(read_worker(
                id,
                Arc::clone(&backend),
                Arc::clone(&read_rx),
                omit,
            ));
        }

        let mut write_txs = Vec::with_capacity(config.num_writers);
        for id in 0..config.num_writers {
            let (tx, rx) = mpsc::channel::<WriteJob>(config.write_queue_size);
            write_txs.push(tx);
            tokio::spawn(write_worker(id, Arc::clone(&backend), rx));
        }
        debug!(
            readers = config.num_readers,
            writers = config.num_writers,
            readq = config.read_queue_size,
            writeq = config.write_queue_size,
            "store queues started"
        );

        Arc::new(Self {
            backend,
            tables: TtlTables::new(&config.ttls),
            read_tx: parking_lot::Mutex::new(Some(read_tx)),
            write_txs: parking_lot::Mutex::new(Some(write_txs)),
        })
    }

    /// Direct access to the wrapped backend (tests, schema setup).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Stable shard of a key: writes of one key always pick the same queue.
    fn shard(key: &str, shards: usize) -> usize {
        let sum: usize = key.bytes().map(usize::from).sum();
        sum % shards
    }
}

#[async_trait]
impl<B: StoreBackend> ChunkStore for QueuedStore<B> {
    async fn search(
        &self,
        key: &str,
        ttl: u32,
        from: u32,
        to: u32,
    ) -> Result<Vec<IterGen>, StoreError> {
        if from > to {
            return Err(StoreError::StartBeforeEnd);
        }
        if from == to {
            return Ok(Vec::new());
        }
        let table = self.tables.table(ttl)?.name.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ReadRequest {
            table,
            key: key.to_string(),
            from,
            to,
            enqueued: Instant::now(),
            reply: reply_tx,
        };
        let tx = self
            .read_tx
            .lock()
            .clone()
            .ok_or(StoreError::Stopped)?;
        tx.try_send(request).map_err(|_| {
            STORE_READ_QUEUE_FULL.inc();
            StoreError::ReadQueueFull
        })?;
        reply_rx.await.map_err(|_| StoreError::Stopped)?
    }

    async fn add(&self, cwr: ChunkWriteRequest) -> Result<(), StoreError> {
        let table = self.tables.table(cwr.ttl)?.name.clone();
        let tx = {
            let guard = self.write_txs.lock();
            let txs = guard.as_ref().ok_or(StoreError::Stopped)?;
            txs[Self::shard(&cwr.key, txs.len())].clone()
        };
        tx.send(WriteJob { table, cwr })
            .await
            .map_err(|_| StoreError::Stopped)
    }

    async fn stop(&self) {
        // dropping the senders lets the workers drain and exit
        self.read_tx.lock().take();
        self.write_txs.lock().take();
    }
}

async fn read_worker<B: StoreBackend>(
    id: usize,
    backend: Arc<B>,
    rx: Arc<Mutex<mpsc::Receiver<ReadRequest>>>,
    omit_timeout: Duration,
) {
    loop {
        let request = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(request) => request,
                None => break,
            }
        };
        let waited = request.enqueued.elapsed();
        STORE_READ_WAIT_SECONDS.observe(waited.as_secs_f64());
        if waited > omit_timeout {
            STORE_OMIT_OLD_READ.inc();
            let _ = request.reply.send(Err(StoreError::ReadTooOld));
            continue;
        }
        let started = Instant::now();
        let result = backend
            .fetch(&request.table, &request.key, request.from, request.to)
            .await;
        STORE_READ_EXEC_SECONDS.observe(started.elapsed().as_secs_f64());
        let _ = request.reply.send(result);
    }
    debug!(worker = id, "read worker exiting");
}

async fn write_worker<B: StoreBackend>(
    id: usize,
    backend: Arc<B>,
    mut rx: mpsc::Receiver<WriteJob>,
) {
    while let Some(job) = rx.recv().await {
        let mut attempts: u64 = 0;
        loop {
            match backend.persist(&job.table, &job.cwr).await {
                Ok(()) => {
                    STORE_CHUNK_SAVE_OK.inc();
                    debug!(key = %job.cwr.key, t0 = job.cwr.t0, "chunk saved");
                    break;
                }
                Err(err) => {
                    STORE_CHUNK_SAVE_FAIL.inc();
                    if attempts % 20 == 0 {
                        warn!(
                            key = %job.cwr.key,
                            t0 = job.cwr.t0,
                            attempts = attempts + 1,
                            %err,
                            "failed to save chunk, backing off"
                        );
                    }
                    let backoff = Duration::from_millis((100 * attempts).min(2000));
                    tokio::time::sleep(backoff).await;
                    attempts += 1;
                }
            }
        }
    }
    debug!(worker = id, "write worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::encode_points;
    use crate::store::memory::MemoryBackend;
    use crate::types::Point;

    fn config() -> StoreConfig {
        StoreConfig {
            read_queue_size: 16,
            write_queue_size: 16,
            num_readers: 2,
            num_writers: 2,
            omit_read_timeout_secs: 60,
            ttls: vec![3600],
        }
    }

    fn cwr(key: &str, t0: u32) -> ChunkWriteRequest {
        let points = vec![Point::new(1.0, t0)];
        let data = encode_points(t0, 600, &points).unwrap();
        ChunkWriteRequest::new(key.to_string(), 3600, t0, data)
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let store = QueuedStore::new(MemoryBackend::new(), &config());
        store.add(cwr("m", 600)).await.unwrap();
        store.add(cwr("m", 1200)).await.unwrap();

        // writes are async; poll until the workers have drained them
        let mut chunks = Vec::new();
        for _ in 0..100 {
            chunks = store.search("m", 3600, 600, 1800).await.unwrap();
            if chunks.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let ts: Vec<u32> = chunks.iter().map(|c| c.ts()).collect();
        assert_eq!(ts, vec![600, 1200]);
        store.stop().await;
    }

    #[tokio::test]
    async fn test_search_validation() {
        let store = QueuedStore::new(MemoryBackend::new(), &config());
        assert_eq!(
            store.search("m", 3600, 100, 50).await.unwrap_err(),
            StoreError::StartBeforeEnd
        );
        assert!(store.search("m", 3600, 100, 100).await.unwrap().is_empty());
        assert_eq!(
            store.search("m", 9999, 0, 100).await.unwrap_err(),
            StoreError::TableNotFound
        );
        store.stop().await;
    }

    #[tokio::test]
    async fn test_read_too_old_is_dropped() {
        let mut cfg = config();
        cfg.omit_read_timeout_secs = 0;
        let store = QueuedStore::new(MemoryBackend::new(), &cfg);
        // any nonzero queue wait exceeds a zero timeout
        assert_eq!(
            store.search("m", 3600, 0, 100).await.unwrap_err(),
            StoreError::ReadTooOld
        );
        store.stop().await;
    }

    #[tokio::test]
    async fn test_write_retries_until_success() {
        let backend = MemoryBackend::new();
        backend.fail_next_persists(2);
        let store = QueuedStore::new(backend, &config());
        store.add(cwr("m", 600)).await.unwrap();

        let mut chunks = Vec::new();
        for _ in 0..200 {
            chunks = store.search("m", 3600, 600, 1200).await.unwrap();
            if !chunks.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(chunks.len(), 1, "persist must eventually succeed");
        store.stop().await;
    }

    #[tokio::test]
    async fn test_shard_is_stable() {
        assert_eq!(
            QueuedStore::<MemoryBackend>::shard("some.metric", 4),
            QueuedStore::<MemoryBackend>::shard("some.metric", 4)
        );
    }

    #[tokio::test]
    async fn test_stopped_store_rejects_requests() {
        let store = QueuedStore::new(MemoryBackend::new(), &config());
        store.stop().await;
        assert_eq!(
            store.search("m", 3600, 0, 100).await.unwrap_err(),
            StoreError::Stopped
        );
        assert_eq!(store.add(cwr("m", 600)).await.unwrap_err(), StoreError::Stopped);
    }
}
