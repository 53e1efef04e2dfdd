//! Densify-to-grid: turn sparse, possibly unaligned input into an
//! evenly-spaced sequence over `[from, to)`
//!
//! Storage hands back whatever points exist; callers want a series they can
//! index by time arithmetic. `fix` maps every input point onto a grid of
//! timestamps at the archive's native interval and fills every remaining
//! slot with a NaN marker. The result always satisfies:
//!
//! - the first timestamp is the smallest multiple of `interval` that is
//!   `>= from`
//! - the last timestamp is strictly below `to`
//! - consecutive timestamps differ by exactly `interval`
//!
//! Applying `fix` to its own output is a no-op.

use crate::types::Point;

/// Densify `points` onto the `interval` grid covering `[from, to)`.
///
/// Each input point lands in the bucket of the smallest grid timestamp at or
/// above its own timestamp, i.e. the half-open window `(t - interval, t]`
/// belongs to grid slot `t`. When several inputs land in one bucket the
/// last-seen one wins. Inputs beyond the final grid slot are dropped. This
/// function never fails; with no input at all the whole grid comes back as
/// NaN markers.
///
/// # Panics
///
/// Panics if `interval` is 0; the planner never produces one.
pub fn fix(points: Vec<Point>, from: u32, to: u32, interval: u32) -> Vec<Point> {
    // first grid slot at or after `from`
    let first = from.next_multiple_of(interval);
    if to == 0 || first > to - 1 {
        // the requested range is too narrow for the interval
        return Vec::new();
    }
    // last grid slot strictly below `to`
    let last = (to - 1) - ((to - 1) % interval);

    let n = ((last - first) / interval + 1) as usize;
    let mut out: Vec<Point> = (0..n)
        .map(|i| Point::null(first + i as u32 * interval))
        .collect();

    for p in points {
        let bucket = p.ts.next_multiple_of(interval);
        if bucket < first || bucket > last {
            continue;
        }
        let slot = ((bucket - first) / interval) as usize;
        out[slot].val = p.val;
    }
    out
}
