//! String interning pool for item error messages
//!
//! Monitoring fleets repeat the same polling error across thousands of
//! items ("connection refused", "timeout"). Interning stores each distinct
//! message once; holders share an `Arc<str>`, and releasing is just
//! dropping the handle. `purge_unused` sweeps entries nobody references
//! anymore, typically from the housekeeping pass.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Thread-safe interning pool for short strings
#[derive(Debug, Default)]
pub struct StringPool {
    entries: RwLock<HashMap<String, Arc<str>>>,
}

impl StringPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning a shared handle
    ///
    /// Repeated calls with the same string return clones of one allocation.
    pub fn acquire(&self, s: &str) -> Arc<str> {
        if let Some(existing) = self.entries.read().get(s) {
            return Arc::clone(existing);
        }
        let mut entries = self.entries.write();
        // racing writer may have inserted between the locks
        if let Some(existing) = entries.get(s) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(s);
        entries.insert(s.to_string(), Arc::clone(&interned));
        interned
    }

    /// Drop pool entries with no outside references, returning the count
    pub fn purge_unused(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, v| Arc::strong_count(v) > 1);
        before - entries.len()
    }

    /// Number of distinct strings currently interned
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when the pool holds no strings
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_shares_one_allocation() {
        let pool = StringPool::new();
        let a = pool.acquire("connection refused");
        let b = pool.acquire("connection refused");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_purge_drops_only_unreferenced_entries() {
        let pool = StringPool::new();
        let held = pool.acquire("timeout");
        drop(pool.acquire("gone"));
        assert_eq!(pool.len(), 2);

        let purged = pool.purge_unused();
        assert_eq!(purged, 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(&*held, "timeout");
    }
}
