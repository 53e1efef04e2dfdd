//! Archive model: the native raw series plus pre-aggregated rollup bands
//!
//! The write path (out of scope here) maintains lower-resolution copies of
//! every metric according to a server-wide list of [`AggregationBand`]s. The
//! planner only needs their shape: the band's time step, how it is chunked
//! on disk, and whether it has been backfilled far enough to serve reads
//! (`ready`).

use serde::{Deserialize, Serialize};

/// A pre-aggregated rollup band.
///
/// `span` is the band's step in seconds (600 = one point per 10 minutes),
/// `chunk_span` the duration covered by one on-disk chunk, and `num_chunks`
/// how many chunks of this band the write path keeps hot in memory. A band
/// that is still backfilling has `ready == false` and is skipped by the
/// planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBand {
    /// Time step of the band in seconds.
    pub span: u32,
    /// Duration covered by one on-disk chunk of this band, in seconds.
    pub chunk_span: u32,
    /// Number of chunks of this band kept hot.
    pub num_chunks: u32,
    /// Whether the band may serve reads.
    #[serde(default = "default_ready")]
    pub ready: bool,
}

fn default_ready() -> bool {
    true
}

impl AggregationBand {
    /// Create a ready band.
    pub fn new(span: u32, chunk_span: u32, num_chunks: u32) -> Self {
        Self {
            span,
            chunk_span,
            num_chunks,
            ready: true,
        }
    }

    /// How many points this band yields over a range of `range` seconds.
    pub fn points_over(&self, range: u32) -> u32 {
        range / self.span
    }
}

/// Check that a band list is sorted by strictly ascending span.
///
/// The planner walks bands from finest to coarsest and relies on this
/// ordering; configuration loading rejects lists that violate it.
pub fn bands_sorted(bands: &[AggregationBand]) -> bool {
    bands.windows(2).all(|w| w[0].span < w[1].span)
}
