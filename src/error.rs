//! Error types for the value cache

use thiserror::Error;

use crate::backing::StoreError;
use crate::types::{Timestamp, ValueType};

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// The item has never been written to the cache
    #[error("Item not found: {0}")]
    NotFound(u64),

    /// An element with this id already exists in the table
    #[error("Element already exists: {0}")]
    AlreadyExists(u64),

    /// The memory budget is exhausted
    #[error("Allocation of {requested} bytes failed: {used} of {capacity} bytes in use")]
    AllocationFailure {
        /// Bytes the operation tried to charge
        requested: usize,
        /// Bytes currently charged against the budget
        used: usize,
        /// Total budget capacity in bytes
        capacity: usize,
    },

    /// The backing historical store reported a failure
    #[error("Backing store error: {0}")]
    BackingStore(#[from] StoreError),

    /// Cache plus backing store could not satisfy the requested range or count
    ///
    /// Queries never return partial results; this error is the total-failure
    /// outcome.
    #[error("Insufficient data: have {available}, need {needed}")]
    InsufficientData {
        /// Points (or seconds) available after the fallback fetch
        available: usize,
        /// Points (or seconds) the request asked for
        needed: usize,
    },

    /// A value of an unexpected type reached a typed code path
    #[error("Invalid value type: expected {expected}, got {got}")]
    InvalidValueType {
        /// Type the cache entry holds
        expected: ValueType,
        /// Type that arrived
        got: ValueType,
    },

    /// A sample is timestamped too far ahead of the wall clock
    #[error("Timestamp {ts} is too far ahead of current time {now}")]
    TimestampAhead {
        /// The rejected sample timestamp
        ts: Timestamp,
        /// Wall-clock time at rejection
        now: Timestamp,
    },

    /// A buffer operation violated the time ordering or capacity rules
    #[error("Ring buffer error: {0}")]
    RingBuffer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CacheError>;
