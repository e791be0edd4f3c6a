//! Cache operation counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters updated on every cache operation
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    db_requests: AtomicU64,
    db_fails: AtomicU64,
    fails: AtomicU64,
    values_written: AtomicU64,
}

impl CacheStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A read was answered entirely from memory
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A read needed the backing store
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A backing store request was issued
    pub fn record_db_request(&self) {
        self.db_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A backing store request failed
    pub fn record_db_fail(&self) {
        self.db_fails.fetch_add(1, Ordering::Relaxed);
    }

    /// A read failed outright
    pub fn record_fail(&self) {
        self.fails.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples accepted on the write path
    pub fn record_values_written(&self, n: u64) {
        self.values_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the counters out
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            db_requests: self.db_requests.load(Ordering::Relaxed),
            db_fails: self.db_fails.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
            values_written: self.values_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Reads answered entirely from memory
    pub hits: u64,
    /// Reads that needed the backing store
    pub misses: u64,
    /// Backing store requests issued
    pub db_requests: u64,
    /// Backing store requests that failed
    pub db_fails: u64,
    /// Reads that failed outright
    pub fails: u64,
    /// Samples accepted on the write path
    pub values_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_db_request();
        stats.record_values_written(5);

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.db_requests, 1);
        assert_eq!(snap.db_fails, 0);
        assert_eq!(snap.values_written, 5);
    }
}
