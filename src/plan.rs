//! Request planning: pick an archive and a consolidation factor per request
//!
//! A batch of requests (one per metric, possibly with different native
//! intervals) must come back at one shared output interval. For each batch
//! the planner decides:
//!
//! - which archive to read: the native raw series or one of the configured
//!   rollup bands
//! - the output interval every series is emitted at
//! - the per-request runtime consolidation factor (`agg_num`)
//!
//! Selection weighs how close each archive's point count lands to the
//! requested `max_points`: reading raw and consolidating 240 points down to
//! a 100-point target beats a rollup that only has 40, but a rollup with 20
//! points beats consolidating 240 down to 39. Coarser archives win ties
//! because they are cheaper to read.

use crate::consolidation::{agg_every, Consolidator};
use crate::error::PlanError;
use crate::rollup::{bands_sorted, AggregationBand};
use crate::types::MetricKey;
use serde::{Deserialize, Serialize};

/// A band only qualifies when it still yields at least
/// `max_points / MIN_POINTS_FACTOR` points over the requested range.
pub const MIN_POINTS_FACTOR: u32 = 2;

/// A single metric read request, before and after planning.
///
/// The caller fills the request fields; [`align_requests`] fills the plan
/// fields. `archive` is 0 for native raw data and 1-based for rollup bands.
/// `arch_interval` is the step of the data read from storage,
/// `out_interval = arch_interval * agg_num` the step of the emitted series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Req {
    /// Metric id to read.
    pub key: MetricKey,
    /// Human-readable name reported back on the series.
    pub target: String,
    /// Range start (inclusive), epoch seconds.
    pub from: u32,
    /// Range end (exclusive), epoch seconds.
    pub to: u32,
    /// Target maximum number of output points.
    pub max_points: u32,
    /// Aggregation used for runtime consolidation.
    pub consolidator: Consolidator,
    /// Native step of this metric in seconds.
    pub raw_interval: u32,
    /// Retention hint forwarded to the store for table selection.
    pub ttl: u32,

    /// Chosen archive: 0 = raw, n = nth rollup band (1-based).
    pub archive: usize,
    /// Step of the archive actually read.
    pub arch_interval: u32,
    /// Step of the emitted series.
    pub out_interval: u32,
    /// Runtime consolidation factor; 1 means none.
    pub agg_num: u32,
}

impl Req {
    /// Create an unplanned request.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: MetricKey,
        target: String,
        from: u32,
        to: u32,
        max_points: u32,
        consolidator: Consolidator,
        raw_interval: u32,
        ttl: u32,
    ) -> Self {
        Self {
            key,
            target,
            from,
            to,
            max_points,
            consolidator,
            raw_interval,
            ttl,
            archive: 0,
            arch_interval: 0,
            out_interval: 0,
            agg_num: 0,
        }
    }

    fn plan(&mut self, archive: usize, arch_interval: u32, out_interval: u32, agg_num: u32) {
        self.archive = archive;
        self.arch_interval = arch_interval;
        self.out_interval = out_interval;
        self.agg_num = agg_num;
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u32, b: u32) -> u32 {
    a / gcd(a, b) * b
}

/// An archive the planner considers for a batch.
struct Candidate {
    /// 0 = raw, 1-based = rollup band.
    archive: usize,
    /// The archive's step for this batch.
    interval: u32,
    /// Points the archive yields over the requested range.
    points: u32,
}

impl Candidate {
    /// How far the candidate's point count is from the target, as a ratio
    /// >= 1. Over-target candidates score `points / max`, under-target ones
    /// `max / points`; the smallest score wins.
    fn fitness(&self, max_points: u32) -> f64 {
        if self.points == 0 {
            return f64::INFINITY;
        }
        if self.points >= max_points {
            f64::from(self.points) / f64::from(max_points)
        } else {
            f64::from(max_points) / f64::from(self.points)
        }
    }
}

/// Plan a batch of requests against the configured rollup bands.
///
/// All requests in a batch must share `from`, `to` and `max_points` (the
/// function layer above guarantees this); their raw intervals may differ.
/// On success every request comes back with `archive`, `arch_interval`,
/// `out_interval` and `agg_num` filled such that
/// `arch_interval * agg_num == out_interval` and the output interval is a
/// common multiple of all raw intervals in the batch.
///
/// Validation failures (`to <= from`, zero `max_points` or raw interval,
/// unsorted bands, empty batch) fail the whole batch; archive selection
/// itself cannot fail because raw is always a candidate.
pub fn align_requests(
    mut reqs: Vec<Req>,
    bands: &[AggregationBand],
) -> Result<Vec<Req>, PlanError> {
    if reqs.is_empty() {
        return Err(PlanError::EmptyBatch);
    }
    if !bands_sorted(bands) {
        return Err(PlanError::UnsortedBands);
    }
    let (from, to, max_points) = (reqs[0].from, reqs[0].to, reqs[0].max_points);
    for req in &reqs {
        if req.to <= req.from {
            return Err(PlanError::InvalidRange {
                from: req.from,
                to: req.to,
            });
        }
        if req.raw_interval == 0 {
            return Err(PlanError::ZeroRawInterval);
        }
        debug_assert!(
            req.from == from && req.to == to && req.max_points == max_points,
            "batch must share from/to/max_points"
        );
    }
    if max_points == 0 {
        return Err(PlanError::ZeroMaxPoints);
    }
    let range = to - from;

    // the batch shares one output interval, so raw reads are modeled at the
    // least common multiple of all native intervals in the batch
    let common_raw = reqs.iter().map(|r| r.raw_interval).fold(1, lcm);

    let mut candidates = vec![Candidate {
        archive: 0,
        interval: common_raw,
        points: range / common_raw,
    }];
    for (i, band) in bands.iter().enumerate() {
        if !band.ready {
            continue;
        }
        let points = band.points_over(range);
        if u64::from(points) * u64::from(MIN_POINTS_FACTOR) >= u64::from(max_points) {
            candidates.push(Candidate {
                archive: i + 1,
                interval: band.span,
                points,
            });
        }
    }

    let mut best = &candidates[0];
    for cand in &candidates[1..] {
        let (fc, fb) = (cand.fitness(max_points), best.fitness(max_points));
        if fc < fb || (fc == fb && cand.interval >= best.interval) {
            best = cand;
        }
    }

    if best.archive == 0 {
        // every request reads its own native archive; the group interval
        // grows in multiples of common_raw until it fits under max_points
        let agg = agg_every(range / common_raw, max_points);
        let out_interval = common_raw * agg;
        for req in &mut reqs {
            let agg_num = out_interval / req.raw_interval;
            req.plan(0, req.raw_interval, out_interval, agg_num);
        }
    } else {
        let band = &bands[best.archive - 1];
        let agg = agg_every(range / band.span, max_points);
        let out_interval = band.span * agg;
        for req in &mut reqs {
            req.plan(best.archive, band.span, out_interval, agg);
        }
    }
    Ok(reqs)
}
