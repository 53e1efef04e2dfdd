//! On-wire chunk format
//!
//! A chunk is the unit both the store and the cache deal in: a time-bounded
//! blob of encoded points plus its start timestamp (`t0`). The blob is
//! self-describing up to its span:
//!
//! ```text
//! byte 0          format version
//! byte 1          span code (index into CHUNK_SPANS)
//! bytes 2..       point payload: per point, u32 LE offset from t0 + f64 LE value
//! ```
//!
//! Carrying the span inside the blob lets readers compute chunk coverage
//! without consulting any schedule, which the cache's gap detection relies
//! on. A blob shorter than the two header bytes is corrupt on its face
//! ([`StoreError::ChunkTooSmall`]); corruption is never fatal to the
//! process, the read path counts and skips it.

mod itergen;

pub use itergen::{IterGen, PointIter};

use crate::error::StoreError;
use crate::types::Point;
use bytes::{BufMut, Bytes, BytesMut};

/// Chunk format: span-aware point payload, version 1.
pub const FORMAT_POINTS_V1: u8 = 1;

/// Header bytes preceding the point payload.
pub const HEADER_LEN: usize = 2;

/// Encoded size of one point in the payload.
pub const POINT_LEN: usize = 12;

/// The legal chunk spans, in seconds.
///
/// Chunks may only cover one of these durations; the blob header stores an
/// index into this table rather than the raw span. Keeping the set closed
/// also guarantees that spans divide evenly into the store's row windows.
pub const CHUNK_SPANS: [u32; 20] = [
    1, 5, 10, 15, 20, 30, 60, 90, 120, 300, 600, 900, 1200, 1800, 3600, 7200, 10800, 21600,
    43200, 86400,
];

/// Look up the span code for a span, if it is a legal one.
pub fn span_code(span: u32) -> Option<u8> {
    CHUNK_SPANS.iter().position(|&s| s == span).map(|i| i as u8)
}

/// Encode points into a chunk blob starting at `t0` covering `span` seconds.
///
/// Points outside `[t0, t0 + span)` are rejected; an illegal span is an
/// error rather than a silently mis-sized chunk.
pub fn encode_points(t0: u32, span: u32, points: &[Point]) -> Result<Bytes, StoreError> {
    let code = span_code(span)
        .ok_or_else(|| StoreError::CorruptChunk(format!("invalid chunk span {}", span)))?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + points.len() * POINT_LEN);
    buf.put_u8(FORMAT_POINTS_V1);
    buf.put_u8(code);
    for p in points {
        if p.ts < t0 || p.ts - t0 >= span {
            return Err(StoreError::CorruptChunk(format!(
                "point ts {} outside chunk [{}, {})",
                p.ts,
                t0,
                t0 + span
            )));
        }
        buf.put_u32_le(p.ts - t0);
        buf.put_f64_le(p.val);
    }
    Ok(buf.freeze())
}
