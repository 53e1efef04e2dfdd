//! Process-wide chunk cache
//!
//! A bounded in-memory cache of encoded chunks keyed by metric, sitting
//! between the read coordinator and the durable store. Repeat queries and
//! partial-range extensions are served from memory; only the uncovered
//! inner range of a query goes to the store.
//!
//! # Locking
//!
//! The metric map sits behind a readers-writer lock: `search` takes the
//! read lock, `add`/`evict`/`reset` the write lock. Eviction runs on its
//! own task consuming the accountant's queue and yields back to the
//! scheduler after every single write-locked removal, so a burst of
//! evictions cannot starve readers.
//!
//! # Consistency
//!
//! Eviction is eventually consistent with reads: a reader may be handed a
//! chunk an instant before it is evicted, which is safe because handles
//! share the underlying buffer. No reader ever observes a partially
//! removed chunk; removal happens wholesale under the write lock.

mod accnt;
mod metric;

pub use accnt::{Accountant, EvictTarget};
pub use metric::MetricCache;

use crate::chunk::IterGen;
use crate::metrics::{
    CACHE_CHUNK_HIT, CACHE_CHUNK_PUSH_HOT, CACHE_EVICTIONS, CACHE_METRIC_HIT_FULL,
    CACHE_METRIC_HIT_PARTIAL, CACHE_METRIC_MISS,
};
use crate::types::MetricKey;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Result of a cache search over `[from, until)`.
///
/// `start` covers the range from its beginning, `end` from its end, both in
/// ascending timestamp order. `[from, until)` on the result is the inner
/// range the cache could not cover; when `complete` is set, `start` alone
/// covers everything and `end` stays empty.
#[derive(Debug, Default)]
pub struct CacheSearchResult {
    /// Chunks covering the range from the front, until the first gap.
    pub start: Vec<IterGen>,
    /// Chunks covering the range from the back, in timestamp order.
    pub end: Vec<IterGen>,
    /// Whether `start` alone covers the whole range.
    pub complete: bool,
    /// Start of the range still missing after `start`.
    pub from: u32,
    /// End of the range still missing before `end`.
    pub until: u32,
}

impl CacheSearchResult {
    /// An empty result: the whole range is still uncovered.
    pub fn miss(from: u32, until: u32) -> Self {
        Self {
            from,
            until,
            ..Default::default()
        }
    }

    /// Total chunks returned.
    pub fn hits(&self) -> usize {
        self.start.len() + self.end.len()
    }
}

/// The process-wide chunk cache.
///
/// Constructed once by the embedding program and shared by `Arc`; the
/// accountant and the eviction task live exactly as long as the cache.
pub struct ChunkCache {
    metrics: RwLock<HashMap<MetricKey, MetricCache>>,
    accnt: Accountant,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl ChunkCache {
    /// Create a cache with the given byte budget and start its eviction task.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(max_size: u64) -> Arc<Self> {
        let (accnt, mut evict_rx) = Accountant::new(max_size);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cache = Arc::new(Self {
            metrics: RwLock::new(HashMap::new()),
            accnt,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        });

        let evictor = Arc::clone(&cache);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    target = evict_rx.recv() => match target {
                        Some(target) => {
                            evictor.evict(&target);
                            // let queued readers in between eviction steps
                            tokio::task::yield_now().await;
                        }
                        None => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        cache
    }

    /// Insert a chunk for a metric, linking it to its predecessor.
    ///
    /// `prev_ts` of 0 means the predecessor is unknown. Ownership of the
    /// chunk handle moves into the cache; the accountant is told about the
    /// new bytes and may react with evictions.
    pub fn add(&self, metric: &str, prev_ts: u32, itgen: IterGen) {
        let (ts, size) = (itgen.ts(), itgen.size());
        {
            let mut metrics = self.metrics.write();
            metrics
                .entry(metric.to_string())
                .or_insert_with(MetricCache::new)
                .add(prev_ts, itgen);
        }
        self.accnt.add_chunk(metric.to_string(), ts, size as u64);
    }

    /// Insert a chunk only if its metric is hot.
    ///
    /// A metric is hot when it already has cached chunks; the chunk must
    /// also extend past the newest cached one. Cold scans thus never
    /// populate the cache, while ongoing reads of a hot metric keep
    /// extending it forward.
    pub fn cache_if_hot(&self, metric: &str, prev_ts: u32, itgen: IterGen) {
        {
            let metrics = self.metrics.read();
            let Some(met) = metrics.get(metric) else {
                return;
            };
            match met.last_ts() {
                Some(last) if itgen.ts() > last => {}
                _ => return,
            }
        }
        CACHE_CHUNK_PUSH_HOT.inc();
        self.add(metric, prev_ts, itgen);
    }

    /// Collect cached chunks overlapping `[from, until)`.
    ///
    /// Every returned chunk counts as a hit for the accountant's recency
    /// tracking. Hit accounting is submitted asynchronously and cannot
    /// block the read.
    pub fn search(&self, metric: &str, from: u32, until: u32) -> CacheSearchResult {
        let mut res = CacheSearchResult::miss(from, until);
        if from >= until {
            return res;
        }
        {
            let metrics = self.metrics.read();
            let Some(met) = metrics.get(metric) else {
                CACHE_METRIC_MISS.inc();
                return res;
            };
            met.search(from, until, &mut res);
        }
        if res.hits() == 0 {
            CACHE_METRIC_MISS.inc();
        } else {
            CACHE_CHUNK_HIT.inc_by(res.hits() as u64);
            for itgen in res.start.iter().chain(res.end.iter()) {
                self.accnt.hit_chunk(metric.to_string(), itgen.ts());
            }
            if res.complete {
                CACHE_METRIC_HIT_FULL.inc();
            } else {
                CACHE_METRIC_HIT_PARTIAL.inc();
            }
        }
        res
    }

    /// Drop all cached chunks and zero the accounting.
    pub fn reset(&self) {
        self.accnt.reset();
        self.metrics.write().clear();
    }

    /// Stop the eviction task and the accountant.
    pub async fn stop(&self) {
        self.accnt.stop().await;
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
    }

    /// Number of metrics currently cached.
    pub fn metric_count(&self) -> usize {
        self.metrics.read().len()
    }

    /// Bytes currently held, summed over all cached chunks.
    pub fn total_bytes(&self) -> usize {
        self.metrics.read().values().map(|m| m.total_size()).sum()
    }

    fn evict(&self, target: &EvictTarget) {
        let mut metrics = self.metrics.write();
        if let Some(met) = metrics.get_mut(&target.metric) {
            debug!(metric = %target.metric, ts = target.ts, "evicting chunk");
            CACHE_EVICTIONS.inc();
            if met.del(target.ts) == 0 {
                metrics.remove(&target.metric);
            }
        }
    }
}
