//! Per-metric cache entry
//!
//! One `MetricCache` exists per metric that has at least one cached chunk.
//! Chunks live in an ordered map keyed by their start timestamp, plus a
//! previous-chunk pointer per entry so range searches can establish
//! contiguity in both directions. The pointer chain is advisory: every hop
//! is validated by a map lookup, and a pointer naming a chunk that is no
//! longer present is counted and treated as a gap, never dereferenced.

use super::CacheSearchResult;
use crate::chunk::IterGen;
use crate::metrics::CACHE_CORRUPT_PREV;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Cached chunks of a single metric.
#[derive(Debug, Default)]
pub struct MetricCache {
    /// Chunks by start timestamp.
    chunks: BTreeMap<u32, IterGen>,
    /// Start timestamp of each chunk's known predecessor; 0 = unknown.
    prev: HashMap<u32, u32>,
}

impl MetricCache {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a chunk, remembering its predecessor if given.
    ///
    /// A `prev_ts` of 0 means the caller does not know the predecessor. In
    /// that case the predecessor is inferred when a cached chunk ends
    /// exactly where this one starts; an already-known pointer is kept
    /// otherwise.
    pub fn add(&mut self, mut prev_ts: u32, itgen: IterGen) {
        let ts = itgen.ts();
        if prev_ts == 0 {
            if let Some((&candidate, chunk)) = self.chunks.range(..ts).next_back() {
                if chunk.end_ts() == ts {
                    prev_ts = candidate;
                }
            }
        }
        self.chunks.insert(ts, itgen);
        self.prev
            .entry(ts)
            .and_modify(|p| {
                if prev_ts != 0 {
                    *p = prev_ts;
                }
            })
            .or_insert(prev_ts);
    }

    /// Remove the chunk starting at `ts`; returns how many chunks remain.
    pub fn del(&mut self, ts: u32) -> usize {
        self.chunks.remove(&ts);
        self.prev.remove(&ts);
        self.chunks.len()
    }

    /// Number of cached chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunks remain.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Start timestamp of the newest cached chunk.
    pub fn last_ts(&self) -> Option<u32> {
        self.chunks.keys().next_back().copied()
    }

    /// Sum of the in-memory sizes of all cached chunks.
    pub fn total_size(&self) -> usize {
        self.chunks.values().map(|c| c.size()).sum()
    }

    /// Collect the chunks overlapping `[from, until)` into `res`.
    ///
    /// Walks forward from `from` into `res.start` until the first gap, then,
    /// unless that alone covered the range, backward from `until` into
    /// `res.end`. Afterwards `[res.from, res.until)` is the uncovered inner
    /// range the caller still has to fetch from the store.
    pub fn search(&self, from: u32, until: u32, res: &mut CacheSearchResult) {
        if self.chunks.is_empty() {
            return;
        }
        self.search_forward(from, until, res);
        if !res.complete {
            self.search_backward(res.from, until, res);
        }
    }

    fn search_forward(&self, from: u32, until: u32, res: &mut CacheSearchResult) {
        // the chunk containing `from`: newest start at or before it, still covering it
        let mut cur = match self.chunks.range(..=from).next_back() {
            Some((&ts, chunk)) if chunk.end_ts() > from => ts,
            _ => return,
        };
        loop {
            let chunk = &self.chunks[&cur];
            res.start.push(chunk.clone());
            res.from = chunk.end_ts();
            if res.from >= until {
                res.complete = true;
                return;
            }
            let next = match self.chunks.range(cur + 1..).next() {
                Some((&ts, _)) => ts,
                None => return,
            };
            match self.prev.get(&next).copied().unwrap_or(0) {
                0 => return, // predecessor unknown, assume a gap
                p if p == cur => cur = next,
                p if !self.chunks.contains_key(&p) => {
                    CACHE_CORRUPT_PREV.inc();
                    warn!(
                        ts = next,
                        prev = p,
                        "dangling previous-chunk pointer, treating as gap"
                    );
                    return;
                }
                _ => return, // chain skips over us: not contiguous
            }
        }
    }

    fn search_backward(&self, from: u32, until: u32, res: &mut CacheSearchResult) {
        let mut ts = match self.chunks.range(..until).next_back() {
            Some((&ts, _)) => ts,
            None => return,
        };
        while ts >= from {
            let chunk = &self.chunks[&ts];
            res.end.push(chunk.clone());
            res.until = ts;
            let prev = self.prev.get(&ts).copied().unwrap_or(0);
            if prev == 0 {
                break;
            }
            let Some(prev_chunk) = self.chunks.get(&prev) else {
                CACHE_CORRUPT_PREV.inc();
                warn!(ts, prev, "dangling previous-chunk pointer, treating as gap");
                break;
            };
            if prev_chunk.end_ts() != ts {
                break;
            }
            ts = prev;
        }
        // collected newest-first; hand back in timestamp order
        res.end.reverse();
    }
}
