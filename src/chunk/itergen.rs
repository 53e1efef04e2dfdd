//! IterGen: a cacheable handle over one encoded chunk
//!
//! The cache and the store both traffic in `IterGen`s rather than decoded
//! point vectors: the blob stays in its wire encoding in memory, decoding is
//! a cheap iteration that can be repeated, and cloning shares the underlying
//! buffer.

use super::{CHUNK_SPANS, FORMAT_POINTS_V1, HEADER_LEN, POINT_LEN};
use crate::error::StoreError;
use crate::types::Point;
use bytes::Bytes;

/// A lazily-decoding handle over one chunk blob.
///
/// Validated once at construction; after that, iteration cannot fail.
/// Cloning is cheap (the payload is a refcounted [`Bytes`]), which is what
/// makes it safe for the cache to hand copies out under a read lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterGen {
    ts: u32,
    data: Bytes,
}

impl IterGen {
    /// Validate a blob read from the store and wrap it.
    ///
    /// `ts` is the chunk's start timestamp (its storage column key). Fails
    /// with [`StoreError::ChunkTooSmall`] for blobs shorter than the header
    /// and [`StoreError::CorruptChunk`] for unknown versions, unknown span
    /// codes or truncated payloads.
    pub fn new(data: Bytes, ts: u32) -> Result<Self, StoreError> {
        if data.len() < HEADER_LEN {
            return Err(StoreError::ChunkTooSmall);
        }
        if data[0] != FORMAT_POINTS_V1 {
            return Err(StoreError::CorruptChunk(format!(
                "unknown chunk format {}",
                data[0]
            )));
        }
        if data[1] as usize >= CHUNK_SPANS.len() {
            return Err(StoreError::CorruptChunk(format!(
                "unknown span code {}",
                data[1]
            )));
        }
        if (data.len() - HEADER_LEN) % POINT_LEN != 0 {
            return Err(StoreError::CorruptChunk(format!(
                "truncated payload of {} bytes",
                data.len() - HEADER_LEN
            )));
        }
        Ok(Self { ts, data })
    }

    /// The chunk's start timestamp.
    pub fn ts(&self) -> u32 {
        self.ts
    }

    /// The duration this chunk covers, in seconds.
    pub fn span(&self) -> u32 {
        CHUNK_SPANS[self.data[1] as usize]
    }

    /// First timestamp past the chunk: `ts + span`.
    pub fn end_ts(&self) -> u32 {
        self.ts + self.span()
    }

    /// In-memory footprint in bytes, as charged to the cache accountant.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of points in the chunk.
    pub fn len(&self) -> usize {
        (self.data.len() - HEADER_LEN) / POINT_LEN
    }

    /// True when the chunk carries no points.
    pub fn is_empty(&self) -> bool {
        self.data.len() == HEADER_LEN
    }

    /// Iterate over the chunk's points in timestamp order.
    pub fn iter(&self) -> PointIter<'_> {
        PointIter {
            t0: self.ts,
            payload: &self.data[HEADER_LEN..],
        }
    }
}

/// Iterator over the points of one chunk.
pub struct PointIter<'a> {
    t0: u32,
    payload: &'a [u8],
}

impl Iterator for PointIter<'_> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.payload.len() < POINT_LEN {
            return None;
        }
        let (head, rest) = self.payload.split_at(POINT_LEN);
        self.payload = rest;
        let offset = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let val = f64::from_le_bytes(head[4..12].try_into().expect("12-byte point record"));
        Some(Point::new(val, self.t0 + offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.payload.len() / POINT_LEN;
        (n, Some(n))
    }
}

impl ExactSizeIterator for PointIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::encode_points;

    #[test]
    fn test_rejects_too_small() {
        assert_eq!(
            IterGen::new(Bytes::from_static(&[1]), 0).unwrap_err(),
            StoreError::ChunkTooSmall
        );
        assert_eq!(
            IterGen::new(Bytes::new(), 0).unwrap_err(),
            StoreError::ChunkTooSmall
        );
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = IterGen::new(Bytes::from_static(&[9, 0]), 0).unwrap_err();
        assert!(matches!(err, StoreError::CorruptChunk(_)));
    }

    #[test]
    fn test_rejects_unknown_span_code() {
        let err = IterGen::new(Bytes::from_static(&[1, 200]), 0).unwrap_err();
        assert!(matches!(err, StoreError::CorruptChunk(_)));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let err = IterGen::new(Bytes::from_static(&[1, 0, 5, 5]), 0).unwrap_err();
        assert!(matches!(err, StoreError::CorruptChunk(_)));
    }

    #[test]
    fn test_empty_chunk() {
        let blob = encode_points(600, 600, &[]).unwrap();
        let itgen = IterGen::new(blob, 600).unwrap();
        assert!(itgen.is_empty());
        assert_eq!(itgen.len(), 0);
        assert_eq!(itgen.iter().count(), 0);
        assert_eq!(itgen.end_ts(), 1200);
    }

    #[test]
    fn test_size_is_blob_length() {
        let points: Vec<Point> = (0..5).map(|i| Point::new(i as f64, 600 + i * 10)).collect();
        let blob = encode_points(600, 60, &points).unwrap();
        let size = blob.len();
        let itgen = IterGen::new(blob, 600).unwrap();
        assert_eq!(itgen.size(), size);
        assert_eq!(itgen.len(), 5);
    }

    #[test]
    fn test_iteration_is_repeatable() {
        let points: Vec<Point> = (0..3).map(|i| Point::new(i as f64, 60 + i * 20)).collect();
        let blob = encode_points(60, 60, &points).unwrap();
        let itgen = IterGen::new(blob, 60).unwrap();
        let first: Vec<Point> = itgen.iter().collect();
        let second: Vec<Point> = itgen.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first, points);
    }
}
