//! Eviction accountant: LRU bookkeeping under a global byte budget
//!
//! The accountant owns no chunks; it tracks `(metric, ts, size)` triples and
//! decides what the cache should drop once the tracked total exceeds the
//! budget. All state lives inside a single event-loop task fed by a bounded
//! channel, so the hot paths (`add_chunk`, `hit_chunk`) are wait-free sends
//! that never hold a lock and never block a read. Eviction decisions flow
//! out through a second bounded channel that the cache's evict task drains.

use crate::metrics::{ACCNT_EVENTS_DROPPED, CACHE_SIZE_BYTES};
use crate::types::MetricKey;
use lru::LruCache;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the accounting event queue.
const EVENT_QUEUE_SIZE: usize = 100_000;

/// Capacity of the eviction decision queue.
const EVICT_QUEUE_SIZE: usize = 1_000;

/// One chunk the cache should remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictTarget {
    /// Metric the chunk belongs to.
    pub metric: MetricKey,
    /// Start timestamp of the chunk.
    pub ts: u32,
}

enum Event {
    AddChunk {
        metric: MetricKey,
        ts: u32,
        size: u64,
    },
    HitChunk {
        metric: MetricKey,
        ts: u32,
    },
    Reset,
    Stop,
}

/// Handle to the accounting event loop.
pub struct Accountant {
    event_tx: mpsc::Sender<Event>,
}

impl Accountant {
    /// Start the accounting loop with the given byte budget.
    ///
    /// Returns the handle plus the receiver of eviction decisions; the
    /// caller (the chunk cache) is expected to consume that queue promptly,
    /// removing one chunk per target.
    pub fn new(max_size: u64) -> (Self, mpsc::Receiver<EvictTarget>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (evict_tx, evict_rx) = mpsc::channel(EVICT_QUEUE_SIZE);
        tokio::spawn(run_event_loop(max_size, event_rx, evict_tx));
        (Self { event_tx }, evict_rx)
    }

    /// Track a chunk that entered the cache.
    pub fn add_chunk(&self, metric: MetricKey, ts: u32, size: u64) {
        self.submit(Event::AddChunk { metric, ts, size });
    }

    /// Mark a chunk as most recently used.
    pub fn hit_chunk(&self, metric: MetricKey, ts: u32) {
        self.submit(Event::HitChunk { metric, ts });
    }

    /// Forget everything.
    pub fn reset(&self) {
        self.submit(Event::Reset);
    }

    /// Terminate the accounting loop.
    pub async fn stop(&self) {
        let _ = self.event_tx.send(Event::Stop).await;
    }

    fn submit(&self, event: Event) {
        // accounting must never back-pressure reads; a dropped event only
        // skews recency, and the drop is visible on a counter
        if self.event_tx.try_send(event).is_err() {
            ACCNT_EVENTS_DROPPED.inc();
        }
    }
}

struct State {
    max_size: u64,
    total: u64,
    /// Per metric: chunk start ts -> size in bytes.
    sizes: HashMap<MetricKey, HashMap<u32, u64>>,
    /// Global recency order across all chunks of all metrics.
    lru: LruCache<(MetricKey, u32), ()>,
}

async fn run_event_loop(
    max_size: u64,
    mut event_rx: mpsc::Receiver<Event>,
    evict_tx: mpsc::Sender<EvictTarget>,
) {
    let mut state = State {
        max_size,
        total: 0,
        sizes: HashMap::new(),
        lru: LruCache::unbounded(),
    };
    while let Some(event) = event_rx.recv().await {
        match event {
            Event::AddChunk { metric, ts, size } => {
                let per_metric = state.sizes.entry(metric.clone()).or_default();
                if per_metric.contains_key(&ts) {
                    // already tracked: an add of a known chunk is just a touch
                    state.lru.get(&(metric, ts));
                    continue;
                }
                per_metric.insert(ts, size);
                state.total += size;
                state.lru.put((metric, ts), ());
                CACHE_SIZE_BYTES.set(state.total as i64);

                while state.total > state.max_size {
                    let Some(((m, t), ())) = state.lru.pop_lru() else {
                        break;
                    };
                    if let Some(per_metric) = state.sizes.get_mut(&m) {
                        if let Some(sz) = per_metric.remove(&t) {
                            state.total -= sz;
                        }
                        if per_metric.is_empty() {
                            state.sizes.remove(&m);
                        }
                    }
                    CACHE_SIZE_BYTES.set(state.total as i64);
                    debug!(metric = %m, ts = t, "over budget, requesting eviction");
                    if evict_tx.send(EvictTarget { metric: m, ts: t }).await.is_err() {
                        // evict consumer is gone; nothing left to account for
                        return;
                    }
                }
            }
            Event::HitChunk { metric, ts } => {
                state.lru.get(&(metric, ts));
            }
            Event::Reset => {
                state.sizes.clear();
                state.lru.clear();
                state.total = 0;
                CACHE_SIZE_BYTES.set(0);
            }
            Event::Stop => break,
        }
    }
}
