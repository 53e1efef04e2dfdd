//! Core data types used throughout the read path
//!
//! This module defines the fundamental data structures shared across the
//! system:
//!
//! # Key Types
//!
//! - **`Point`**: a single measurement (value + epoch-second timestamp)
//! - **`MetricKey`**: opaque identifier for a metric, handed out by the
//!   (external) metric index
//! - **`Series`**: an evenly-spaced run of points as returned to callers
//!
//! A `Point` with a NaN value is the explicit "no data" marker: the fix
//! stage inserts them so that every series the engine returns is dense and
//! evenly spaced, and the consolidators skip them when reducing.

use crate::consolidation::Consolidator;
use serde::{Deserialize, Serialize};

/// Opaque identifier for a metric.
///
/// Keys are produced by the metric index, which is an external collaborator;
/// the read path only ever treats them as map keys and row-key prefixes.
pub type MetricKey = String;

/// A single data point: a value at an epoch second.
///
/// # Fields
///
/// - `val`: IEEE 754 double; NaN means "no data at this slot"
/// - `ts`: Unix timestamp in seconds (u32 carries us to 2106)
///
/// The struct is `Copy` and 16 bytes, so slices of points move around the
/// pipeline without allocation games.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Measurement value; NaN denotes a hole.
    pub val: f64,
    /// Unix timestamp in seconds.
    pub ts: u32,
}

impl Point {
    /// Create a new data point.
    pub fn new(val: f64, ts: u32) -> Self {
        Self { val, ts }
    }

    /// A "no data" marker at the given timestamp.
    pub fn null(ts: u32) -> Self {
        Self { val: f64::NAN, ts }
    }

    /// True when this point carries no data.
    pub fn is_null(&self) -> bool {
        self.val.is_nan()
    }
}

/// An evenly-spaced series as handed back to the query layer.
///
/// Produced by the read coordinator after the fix and consolidate stages:
/// consecutive timestamps differ by exactly `interval` and holes are NaN
/// points, so downstream consumers can index into the series by time
/// arithmetic alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// The metric this series answers for.
    pub target: String,
    /// The query pattern that selected the metric (verbatim from the caller).
    pub query_pattern: String,
    /// Dense, evenly-spaced points over the requested range.
    pub datapoints: Vec<Point>,
    /// Seconds between consecutive points.
    pub interval: u32,
    /// The consolidator that was applied while producing the series.
    pub consolidator: Consolidator,
    /// The consolidator the caller originally asked for.
    ///
    /// Kept separately because an upstream function layer may override the
    /// effective consolidator while still wanting to report the requested one.
    pub query_cons: Consolidator,
}

impl Series {
    /// Number of points in the series.
    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    /// True when the series holds no points.
    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }
}
