//! Prometheus metrics for the read path
//!
//! Counters, gauges and histograms covering the chunk cache, the eviction
//! accountant and the store queues. Everything registers against the default
//! registry under the `cistern_` prefix; [`gather_metrics`] renders the
//! text exposition for whatever endpoint the embedding program wires up.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};

lazy_static! {
    // === Chunk cache ===

    /// Chunks served from the cache.
    pub static ref CACHE_CHUNK_HIT: IntCounter = register_int_counter!(
        "cistern_cache_chunk_hit_total",
        "Chunks served from the chunk cache"
    )
    .unwrap();

    /// Chunks pushed into the cache because their metric was hot.
    pub static ref CACHE_CHUNK_PUSH_HOT: IntCounter = register_int_counter!(
        "cistern_cache_chunk_push_hot_total",
        "Chunks added to the cache because their metric was already hot"
    )
    .unwrap();

    /// Searches for metrics the cache knows nothing about.
    pub static ref CACHE_METRIC_MISS: IntCounter = register_int_counter!(
        "cistern_cache_metric_miss_total",
        "Cache searches that found no chunks at all"
    )
    .unwrap();

    /// Searches fully answered from the cache.
    pub static ref CACHE_METRIC_HIT_FULL: IntCounter = register_int_counter!(
        "cistern_cache_metric_hit_full_total",
        "Cache searches fully covered by cached chunks"
    )
    .unwrap();

    /// Searches partially answered from the cache.
    pub static ref CACHE_METRIC_HIT_PARTIAL: IntCounter = register_int_counter!(
        "cistern_cache_metric_hit_partial_total",
        "Cache searches partially covered by cached chunks"
    )
    .unwrap();

    /// Dangling previous-chunk pointers found while searching.
    pub static ref CACHE_CORRUPT_PREV: IntCounter = register_int_counter!(
        "cistern_cache_corrupt_prev_total",
        "Chunk chain walks that hit a dangling previous-chunk pointer"
    )
    .unwrap();

    /// Chunks evicted from the cache.
    pub static ref CACHE_EVICTIONS: IntCounter = register_int_counter!(
        "cistern_cache_evictions_total",
        "Chunks evicted from the chunk cache"
    )
    .unwrap();

    /// Bytes currently tracked by the accountant.
    pub static ref CACHE_SIZE_BYTES: IntGauge = register_int_gauge!(
        "cistern_cache_size_bytes",
        "Bytes currently held by the chunk cache"
    )
    .unwrap();

    /// Accounting events dropped because the event queue was full.
    pub static ref ACCNT_EVENTS_DROPPED: IntCounter = register_int_counter!(
        "cistern_cache_accnt_events_dropped_total",
        "Cache accounting events dropped on a full event queue"
    )
    .unwrap();

    // === Store ===

    /// Reads dropped because they waited in the queue too long.
    pub static ref STORE_OMIT_OLD_READ: IntCounter = register_int_counter!(
        "cistern_store_omit_read_too_old_total",
        "Store reads discarded because they outwaited the omit timeout"
    )
    .unwrap();

    /// Reads rejected because the queue was full.
    pub static ref STORE_READ_QUEUE_FULL: IntCounter = register_int_counter!(
        "cistern_store_omit_read_queue_full_total",
        "Store reads rejected on a full read queue"
    )
    .unwrap();

    /// Successful chunk saves.
    pub static ref STORE_CHUNK_SAVE_OK: IntCounter = register_int_counter!(
        "cistern_store_chunk_save_ok_total",
        "Chunks persisted successfully"
    )
    .unwrap();

    /// Failed chunk save attempts (will be retried).
    pub static ref STORE_CHUNK_SAVE_FAIL: IntCounter = register_int_counter!(
        "cistern_store_chunk_save_fail_total",
        "Chunk persist attempts that failed and were retried"
    )
    .unwrap();

    /// Malformed chunk blobs encountered while loading.
    pub static ref STORE_CORRUPT_CHUNKS: IntCounter = register_int_counter!(
        "cistern_store_corrupt_chunks_total",
        "Chunk blobs that failed validation when loaded from the store"
    )
    .unwrap();

    /// Time a read spent waiting in the queue.
    pub static ref STORE_READ_WAIT_SECONDS: Histogram = register_histogram!(
        "cistern_store_read_wait_seconds",
        "Time store reads spent queued before execution",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap();

    /// Time executing a read against the backend.
    pub static ref STORE_READ_EXEC_SECONDS: Histogram = register_histogram!(
        "cistern_store_read_exec_seconds",
        "Time executing store reads against the backend",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .unwrap();

    /// Sizes of chunk blobs as they are loaded.
    pub static ref STORE_CHUNK_SIZE_AT_LOAD: Histogram = register_histogram!(
        "cistern_store_chunk_size_at_load_bytes",
        "Sizes of chunk blobs read from the store",
        prometheus::exponential_buckets(16.0, 4.0, 10).unwrap()
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
