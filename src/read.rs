//! Read coordinator: plan a batch, gather chunks, densify, consolidate
//!
//! One [`ReadEngine`] glues the planner, the chunk cache and the store
//! facade together. Per planned request it asks the cache first, fetches
//! only the uncovered inner range from the store, feeds freshly fetched
//! chunks back into the cache when the metric is hot, and runs the decoded
//! points through fix and consolidate so the caller always receives a
//! dense, evenly-spaced series.
//!
//! Requests in a batch fail independently: one metric's read error never
//! takes down its siblings. A request either yields a complete series or
//! an error, never a partial one.

use crate::cache::ChunkCache;
use crate::chunk::IterGen;
use crate::consolidation::consolidate;
use crate::error::Error;
use crate::fix::fix;
use crate::plan::{align_requests, Req};
use crate::rollup::AggregationBand;
use crate::store::ChunkStore;
use crate::types::{Point, Series};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// The read path, fully wired.
///
/// The embedding program constructs one engine per process and shares it;
/// cache and store are injected so tests can swap the backend.
pub struct ReadEngine {
    cache: Arc<ChunkCache>,
    store: Arc<dyn ChunkStore>,
    bands: Vec<AggregationBand>,
}

impl ReadEngine {
    /// Wire an engine from its collaborators.
    pub fn new(
        cache: Arc<ChunkCache>,
        store: Arc<dyn ChunkStore>,
        bands: Vec<AggregationBand>,
    ) -> Self {
        Self {
            cache,
            store,
            bands,
        }
    }

    /// The rollup bands this engine plans against.
    pub fn bands(&self) -> &[AggregationBand] {
        &self.bands
    }

    /// Plan and execute a batch of requests.
    ///
    /// Validation failures short-circuit the whole batch; read failures are
    /// per-request, so the result carries one `Result` per input request,
    /// in order.
    pub async fn query(&self, reqs: Vec<Req>) -> Result<Vec<Result<Series, Error>>, Error> {
        let reqs = align_requests(reqs, &self.bands)?;
        let series = futures::future::join_all(reqs.iter().map(|req| self.get_series(req))).await;
        Ok(series)
    }

    /// Like [`query`](Self::query), but abandoned at `deadline`.
    ///
    /// On expiry every outstanding store read is left to the omit-timeout
    /// rule and the caller gets [`Error::DeadlineExceeded`]; partial results
    /// are discarded.
    pub async fn query_with_deadline(
        &self,
        reqs: Vec<Req>,
        deadline: Instant,
    ) -> Result<Vec<Result<Series, Error>>, Error> {
        match tokio::time::timeout_at(deadline, self.query(reqs)).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded),
        }
    }

    /// Execute one planned request into a series.
    pub async fn get_series(&self, req: &Req) -> Result<Series, Error> {
        let points = self.gather_points(req).await?;
        let fixed = fix(points, req.from, req.to, req.arch_interval);
        let datapoints = consolidate(fixed, req.agg_num, req.consolidator);
        Ok(Series {
            target: req.target.clone(),
            query_pattern: req.target.clone(),
            datapoints,
            interval: req.out_interval,
            consolidator: req.consolidator,
            query_cons: req.consolidator,
        })
    }

    /// Gather and decode the chunks covering `[req.from, req.to)`.
    ///
    /// Cache first; the store only sees the inner range the cache could not
    /// cover. Chunks are de-duplicated by start timestamp (first source
    /// wins) and points by timestamp, so an overlapping prior chunk from
    /// the store cannot double-count against cached data.
    async fn gather_points(&self, req: &Req) -> Result<Vec<Point>, Error> {
        let key = storage_key(req);
        let res = self.cache.search(&key, req.from, req.to);

        let mut chunks: BTreeMap<u32, IterGen> = BTreeMap::new();
        for chunk in &res.start {
            chunks.entry(chunk.ts()).or_insert_with(|| chunk.clone());
        }
        if !res.complete {
            debug!(
                key = %key,
                from = res.from,
                until = res.until,
                cached = res.hits(),
                "cache partial, fetching remainder from store"
            );
            let fetched = self
                .store
                .search(&key, req.ttl, res.from, res.until)
                .await?;
            // fetched chunks continue right where the cached run ended, so
            // the last cached chunk is the first fetched one's predecessor
            let mut prev = res.start.last().map_or(0, |c| c.ts());
            for chunk in &fetched {
                self.cache.cache_if_hot(&key, prev, chunk.clone());
                prev = chunk.ts();
            }
            for chunk in fetched {
                chunks.entry(chunk.ts()).or_insert(chunk);
            }
            for chunk in &res.end {
                chunks.entry(chunk.ts()).or_insert_with(|| chunk.clone());
            }
        }

        let mut points = Vec::new();
        let mut last_ts: Option<u32> = None;
        for chunk in chunks.values() {
            for point in chunk.iter() {
                if last_ts.map_or(true, |t| point.ts > t) {
                    points.push(point);
                    last_ts = Some(point.ts);
                }
            }
        }
        Ok(points)
    }
}

/// The row key a planned request reads from.
///
/// Raw reads use the metric key itself; rollup reads address the band's
/// pre-aggregated series, which the write path stores under a derived key
/// per span and aggregation.
pub fn storage_key(req: &Req) -> String {
    if req.archive == 0 {
        req.key.clone()
    } else {
        format!("{}_{}_{}", req.key, req.consolidator, req.arch_interval)
    }
}
