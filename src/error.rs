//! Error types for the read path
//!
//! One enum per subsystem, folded into the crate-level [`Error`] with
//! `#[from]` conversions. The variants mirror the failure taxonomy at the
//! read boundary: validation errors fail a request, resource errors are
//! retryable by the caller, corruption is logged and counted but never
//! fatal, and deadline expiry surfaces as cancellation.

use thiserror::Error;

/// Main error type surfaced at the read boundary
#[derive(Error, Debug)]
pub enum Error {
    /// Request planning error
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The query deadline expired before the request completed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-planning (aligner) errors
///
/// Validation failures short-circuit the whole batch: no request is planned
/// if any request in the batch is malformed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    /// The requested time range is empty or negative
    #[error("Invalid time range: from {from} to {to}")]
    InvalidRange {
        /// Requested range start
        from: u32,
        /// Requested range end (exclusive)
        to: u32,
    },

    /// maxDataPoints of zero can never be satisfied
    #[error("Request asks for zero data points")]
    ZeroMaxPoints,

    /// A request carries a raw interval of zero
    #[error("Request has a raw interval of zero")]
    ZeroRawInterval,

    /// Rollup bands must be sorted by ascending span
    #[error("Aggregation bands are not sorted by ascending span")]
    UnsortedBands,

    /// An empty batch has nothing to align
    #[error("Empty request batch")]
    EmptyBatch,
}

/// Store errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The search range starts after it ends (fatal for the request)
    #[error("start must be before end")]
    StartBeforeEnd,

    /// The read queue is full; the caller may retry
    #[error("the read queue is full")]
    ReadQueueFull,

    /// The read waited in the queue past the omit timeout and was dropped
    #[error("the read is too old")]
    ReadTooOld,

    /// A chunk blob too short to carry even its header
    #[error("impossibly small chunk in store")]
    ChunkTooSmall,

    /// No table is configured for the given TTL
    #[error("table for given TTL not found")]
    TableNotFound,

    /// A chunk blob that fails to decode
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// The store has been stopped and no longer accepts requests
    #[error("store is shut down")]
    Stopped,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
