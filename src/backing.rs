//! Backing historical store seam
//!
//! The cache holds only recent samples; anything older lives in a slower
//! history store behind this trait. Implementations are expected to block;
//! the cache calls them while holding the element lock of the item being
//! fetched, so one slow item never stalls the others.

use thiserror::Error;

use crate::types::{ItemId, TimeSeriesPoint, Timestamp, ValueType};

/// Errors surfaced by a backing store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached
    #[error("History store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the query
    #[error("History query failed: {0}")]
    Query(String),
}

/// The shape of a history fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRange {
    /// All samples in `[start, end]`
    ByTime {
        /// Oldest wanted timestamp, inclusive
        start: Timestamp,
        /// Newest wanted timestamp, inclusive
        end: Timestamp,
    },
    /// The newest `count` samples at or before `end`
    ByCount {
        /// Number of samples wanted
        count: usize,
        /// Newest wanted timestamp, inclusive
        end: Timestamp,
    },
}

/// One history fetch issued by the cache on a miss
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Item being fetched
    pub itemid: ItemId,
    /// Type the cache entry currently holds
    pub value_type: ValueType,
    /// Time or count bounds
    pub range: FetchRange,
}

/// A readable history store the cache falls back to on a miss
///
/// Returned points may arrive in any order; the cache sorts them before
/// merging. Returning fewer points than asked for is not an error, the
/// cache decides afterwards whether the request can be satisfied.
pub trait BackingStore: Send + Sync {
    /// Fetch samples for one item
    fn fetch(&self, req: &FetchRequest) -> Result<Vec<TimeSeriesPoint>, StoreError>;
}

/// A store with no history at all; useful for cache-only deployments
#[derive(Debug, Default)]
pub struct EmptyStore;

impl BackingStore for EmptyStore {
    fn fetch(&self, _req: &FetchRequest) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        Ok(Vec::new())
    }
}
