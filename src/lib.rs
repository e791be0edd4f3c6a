//! In-memory value cache for a monitoring server
//!
//! Keeps the most recent samples of every monitored item in memory, in
//! front of a slower historical store. Reads ask for "the last N values"
//! or "everything in a time window"; misses fall back to the store and the
//! result is merged back into the cache, so repeated queries stay hot.
//!
//! - Per-item locking: one slow item never blocks the rest
//! - Demand-sized buffers: each item keeps roughly what readers ask for
//! - Bounded memory: every payload byte is charged against one budget
//! - Housekeeping: idle items are evicted after a configurable idle time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backing;
pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod ringbuf;
pub mod stats;
pub mod strpool;
pub mod table;
pub mod types;

pub use backing::{BackingStore, FetchRange, FetchRequest, StoreError};
pub use cache::{ValueCache, ValueQuery};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use types::{ItemId, TimeSeriesPoint, Timestamp, Value, ValueRecord, ValueType};

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_sanity() {
        assert_eq!(2 + 2, 4);
    }
}
