//! Chunk cache eviction under a byte budget
//!
//! Exercises the cache + accountant pair end to end: the tracked total must
//! converge back under the budget after any burst of inserts, recently hit
//! chunks must be the survivors, and a reset must start accounting from
//! zero.

use cistern_tsdb::cache::ChunkCache;
use cistern_tsdb::chunk::{encode_points, IterGen};
use cistern_tsdb::types::Point;
use tokio::time::{sleep, Duration};

fn itgen(t0: u32, span: u32) -> IterGen {
    let points = vec![Point::new(f64::from(t0), t0)];
    IterGen::new(encode_points(t0, span, &points).unwrap(), t0).unwrap()
}

async fn converge_under(cache: &ChunkCache, budget: u64) {
    for _ in 0..200 {
        if cache.total_bytes() as u64 <= budget {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "cache did not converge under budget: {} > {}",
        cache.total_bytes(),
        budget
    );
}

#[tokio::test]
async fn test_total_bytes_stay_bounded() {
    let chunk_size = itgen(600, 60).size() as u64;
    let budget = chunk_size * 5;
    let cache = ChunkCache::new(budget);

    // 4x over budget across several metrics
    for (i, metric) in ["a", "b", "c", "d"].iter().enumerate() {
        let base = 600 + i as u32;
        let mut prev = 0;
        for j in 0..5u32 {
            let t0 = base + j * 60;
            cache.add(metric, prev, itgen(t0, 60));
            prev = t0;
        }
    }

    converge_under(&cache, budget).await;
    assert!(cache.total_bytes() as u64 <= budget);
    cache.stop().await;
}

#[tokio::test]
async fn test_recently_hit_chunks_survive() {
    let chunk_size = itgen(600, 60).size() as u64;
    // room for 3 chunks
    let cache = ChunkCache::new(chunk_size * 3);

    cache.add("keep", 0, itgen(600, 60));
    cache.add("keep", 600, itgen(660, 60));
    cache.add("churn", 0, itgen(6000, 60));

    // touch the oldest chunk; its unhit sibling becomes the LRU victim
    assert_eq!(cache.search("keep", 600, 660).hits(), 1);

    // one chunk over budget forces a single eviction
    cache.add("churn", 6000, itgen(6060, 60));
    converge_under(&cache, chunk_size * 3).await;

    assert_eq!(
        cache.search("keep", 600, 660).hits(),
        1,
        "the hit chunk must be retained"
    );
    assert_eq!(
        cache.search("keep", 660, 720).hits(),
        0,
        "the unhit sibling pays for the overflow"
    );
    cache.stop().await;
}

#[tokio::test]
async fn test_eviction_drops_oldest_first() {
    let chunk_size = itgen(600, 60).size() as u64;
    let cache = ChunkCache::new(chunk_size * 2);

    let mut prev = 0;
    for j in 0..4u32 {
        let t0 = 600 + j * 60;
        cache.add("m", prev, itgen(t0, 60));
        prev = t0;
    }

    converge_under(&cache, chunk_size * 2).await;

    // the two newest chunks remain and still chain together
    let res = cache.search("m", 720, 840);
    assert_eq!(res.hits(), 2);
    assert!(res.complete);
    // the two oldest are gone
    assert_eq!(cache.search("m", 600, 720).hits(), 0);
    cache.stop().await;
}

#[tokio::test]
async fn test_reset_restarts_accounting() {
    let chunk_size = itgen(600, 60).size() as u64;
    let cache = ChunkCache::new(chunk_size * 2);

    cache.add("m", 0, itgen(600, 60));
    cache.add("m", 600, itgen(660, 60));
    cache.reset();
    assert_eq!(cache.total_bytes(), 0);
    assert_eq!(cache.metric_count(), 0);

    // a fresh budget's worth fits without evictions
    cache.add("m", 0, itgen(720, 60));
    cache.add("m", 720, itgen(780, 60));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.search("m", 720, 840).hits(), 2);
    cache.stop().await;
}
