//! Runtime consolidation: bucket-and-reduce for evenly-spaced series
//!
//! When an archive yields more points than a request wants, the read path
//! collapses every `agg_num` consecutive points into one using one of a
//! fixed set of reducers. Input is expected to be evenly spaced (the fix
//! stage guarantees that), which lets the output stay evenly spaced too:
//! each output point carries the timestamp of the *last slot* of its bucket,
//! even when the trailing bucket is short.
//!
//! NaN values are "no data" markers and are skipped by every reducer; a
//! bucket of only NaNs reduces to NaN (or 0 for [`Consolidator::Cnt`]).

use crate::types::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation function used to collapse a bucket of points into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Consolidator {
    /// Arithmetic mean of the non-NaN values.
    Avg,
    /// Sum of the non-NaN values.
    Sum,
    /// Smallest non-NaN value.
    Min,
    /// Largest non-NaN value.
    Max,
    /// Number of non-NaN values, as f64.
    Cnt,
}

impl fmt::Display for Consolidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Consolidator::Avg => "avg",
            Consolidator::Sum => "sum",
            Consolidator::Min => "min",
            Consolidator::Max => "max",
            Consolidator::Cnt => "cnt",
        };
        write!(f, "{}", name)
    }
}

impl Consolidator {
    /// Parse a consolidator name as it appears in query parameters.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "avg" | "average" => Some(Consolidator::Avg),
            "sum" => Some(Consolidator::Sum),
            "min" => Some(Consolidator::Min),
            "max" => Some(Consolidator::Max),
            "cnt" | "count" => Some(Consolidator::Cnt),
            _ => None,
        }
    }

    /// Reduce a bucket of values, skipping NaN markers.
    ///
    /// All-NaN buckets reduce to NaN, except `Cnt` which reduces to 0.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut count = 0u32;
        for &v in values {
            if v.is_nan() {
                continue;
            }
            sum += v;
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
            count += 1;
        }
        if let Consolidator::Cnt = self {
            return f64::from(count);
        }
        if count == 0 {
            return f64::NAN;
        }
        match self {
            Consolidator::Avg => sum / f64::from(count),
            Consolidator::Sum => sum,
            Consolidator::Min => min,
            Consolidator::Max => max,
            Consolidator::Cnt => f64::from(count),
        }
    }
}

/// Collapse every `agg_num` consecutive points into one.
///
/// Returns the input unchanged when `agg_num <= 1`. Output length is
/// `ceil(len / agg_num)`. The output timestamp of a bucket is the timestamp
/// its last slot *would* have: for a short trailing bucket the missing slots
/// are extrapolated from the input spacing, so the output stays evenly
/// spaced for further processing and hand-off.
pub fn consolidate(points: Vec<Point>, agg_num: u32, consolidator: Consolidator) -> Vec<Point> {
    if agg_num <= 1 || points.is_empty() {
        return points;
    }
    let num = agg_num as usize;
    let mut out = Vec::with_capacity(points.len().div_ceil(num));
    let mut buf: Vec<f64> = Vec::with_capacity(num);

    for bucket in points.chunks(num) {
        buf.clear();
        buf.extend(bucket.iter().map(|p| p.val));
        let last = bucket[bucket.len() - 1];
        let ts = if bucket.len() == num {
            last.ts
        } else {
            // trailing short bucket: place the point where the full bucket
            // would have ended, keeping the output grid even
            let interval = if points.len() >= 2 {
                points[1].ts - points[0].ts
            } else {
                0
            };
            last.ts + (num - bucket.len()) as u32 * interval
        };
        out.push(Point::new(consolidator.reduce(&buf), ts));
    }
    out
}

/// How many points to fold per output point so that `points` fits in `max`.
///
/// This is the runtime consolidation factor the planner uses: the smallest
/// integer `n` such that `points / n <= max`, never less than 1.
pub fn agg_every(points: u32, max_points: u32) -> u32 {
    if max_points == 0 {
        return 1;
    }
    (points.div_ceil(max_points)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(val: f64, ts: u32) -> Point {
        Point::new(val, ts)
    }

    fn assert_points_eq(got: &[Point], want: &[Point]) {
        assert_eq!(got.len(), want.len(), "length mismatch: {:?} vs {:?}", got, want);
        for (g, w) in got.iter().zip(want) {
            assert_eq!(g.ts, w.ts, "ts mismatch: {:?} vs {:?}", got, want);
            if w.val.is_nan() {
                assert!(g.val.is_nan(), "expected NaN at ts {}: {:?}", w.ts, got);
            } else {
                assert_eq!(g.val, w.val, "val mismatch: {:?} vs {:?}", got, want);
            }
        }
    }

    #[test]
    fn test_consolidate_identity_when_factor_one() {
        let input = vec![p(1.0, 1449178131), p(2.0, 1449178141), p(3.0, 1449178151)];
        let out = consolidate(input.clone(), 1, Consolidator::Avg);
        assert_points_eq(&out, &input);
    }

    #[test]
    fn test_consolidate_avg_even() {
        let input = vec![
            p(1.0, 1449178131),
            p(2.0, 1449178141),
            p(3.0, 1449178151),
            p(4.0, 1449178161),
        ];
        let out = consolidate(input, 2, Consolidator::Avg);
        assert_points_eq(&out, &[p(1.5, 1449178141), p(3.5, 1449178161)]);
    }

    #[test]
    fn test_consolidate_avg_short_tail() {
        // the trailing bucket has one point out of two: the output point is
        // placed where the full bucket would have ended
        let input = vec![p(1.0, 1449178131), p(2.0, 1449178141), p(3.0, 1449178151)];
        let out = consolidate(input, 2, Consolidator::Avg);
        assert_points_eq(&out, &[p(1.5, 1449178141), p(3.0, 1449178161)]);
    }

    #[test]
    fn test_consolidate_avg_factor_three() {
        let input = vec![
            p(1.0, 1449178131),
            p(2.0, 1449178141),
            p(3.0, 1449178151),
            p(4.0, 1449178161),
        ];
        let out = consolidate(input, 3, Consolidator::Avg);
        assert_points_eq(&out, &[p(2.0, 1449178151), p(4.0, 1449178181)]);
    }

    #[test]
    fn test_consolidate_factor_covers_all_input() {
        let input = vec![p(1.0, 1449178131), p(2.0, 1449178141), p(3.0, 1449178151)];
        let out = consolidate(input, 3, Consolidator::Avg);
        assert_points_eq(&out, &[p(2.0, 1449178151)]);
    }

    #[test]
    fn test_consolidate_functions() {
        let input = vec![
            p(1.0, 1449178131),
            p(2.0, 1449178141),
            p(3.0, 1449178151),
            p(4.0, 1449178161),
        ];
        let cases: Vec<(Consolidator, Vec<Point>)> = vec![
            (Consolidator::Cnt, vec![p(2.0, 1449178141), p(2.0, 1449178161)]),
            (Consolidator::Min, vec![p(1.0, 1449178141), p(3.0, 1449178161)]),
            (Consolidator::Max, vec![p(2.0, 1449178141), p(4.0, 1449178161)]),
            (Consolidator::Sum, vec![p(3.0, 1449178141), p(7.0, 1449178161)]),
        ];
        for (cons, want) in cases {
            let out = consolidate(input.clone(), 2, cons);
            assert_points_eq(&out, &want);
        }
    }

    #[test]
    fn test_consolidate_skips_nan() {
        let input = vec![p(f64::NAN, 10), p(4.0, 20), p(2.0, 30), p(f64::NAN, 40)];
        let out = consolidate(input.clone(), 2, Consolidator::Avg);
        assert_points_eq(&out, &[p(4.0, 20), p(2.0, 40)]);

        let out = consolidate(input.clone(), 2, Consolidator::Cnt);
        assert_points_eq(&out, &[p(1.0, 20), p(1.0, 40)]);

        let out = consolidate(input, 2, Consolidator::Sum);
        assert_points_eq(&out, &[p(4.0, 20), p(2.0, 40)]);
    }

    #[test]
    fn test_consolidate_all_nan_bucket() {
        let input = vec![p(f64::NAN, 10), p(f64::NAN, 20)];
        let out = consolidate(input.clone(), 2, Consolidator::Avg);
        assert_points_eq(&out, &[p(f64::NAN, 20)]);

        let out = consolidate(input, 2, Consolidator::Cnt);
        assert_points_eq(&out, &[p(0.0, 20)]);
    }

    #[test]
    fn test_consolidate_output_length() {
        // N = ceil(M / k), evenly spaced at k * interval
        for (m, k) in [(7usize, 2u32), (8, 2), (9, 3), (10, 4)] {
            let input: Vec<Point> = (0..m).map(|i| p(i as f64, 10 + 10 * i as u32)).collect();
            let out = consolidate(input, k, Consolidator::Avg);
            assert_eq!(out.len(), m.div_ceil(k as usize));
            for w in out.windows(2) {
                assert_eq!(w[1].ts - w[0].ts, k * 10);
            }
        }
    }

    #[test]
    fn test_agg_every_table() {
        let cases = [
            (60u32, 80u32, 1u32),
            (70, 80, 1),
            (79, 80, 1),
            (80, 80, 1),
            (81, 80, 2),
            (120, 80, 2),
            (150, 80, 2),
            (158, 80, 2),
            (159, 80, 2),
            (160, 80, 2),
            (161, 80, 3),
            (165, 80, 3),
            (180, 80, 3),
        ];
        for (points, max, want) in cases {
            assert_eq!(
                agg_every(points, max),
                want,
                "agg_every({}, {})",
                points,
                max
            );
        }
    }

    #[test]
    fn test_consolidator_parse_display() {
        assert_eq!(Consolidator::parse("avg"), Some(Consolidator::Avg));
        assert_eq!(Consolidator::parse("count"), Some(Consolidator::Cnt));
        assert_eq!(Consolidator::parse("median"), None);
        assert_eq!(Consolidator::Max.to_string(), "max");
    }
}
