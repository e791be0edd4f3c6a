//! Bounded memory budget
//!
//! The cache never allocates past a configured byte limit. Every payload
//! byte and buffer slot is charged here before the allocation happens and
//! released when the owning point is dropped. Exhaustion surfaces as a
//! typed error, not a crash.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CacheError, Result};

/// Byte-accounted allocation budget shared by all cache entries
#[derive(Debug)]
pub struct MemoryBudget {
    capacity: usize,
    used: AtomicUsize,
}

impl MemoryBudget {
    /// Create a budget with the given capacity in bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    /// Charge `bytes` against the budget
    ///
    /// Fails without side effects when the charge would exceed capacity.
    pub fn charge(&self, bytes: usize) -> Result<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.capacity {
                return Err(CacheError::AllocationFailure {
                    requested: bytes,
                    used: current,
                    capacity: self.capacity,
                });
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Return `bytes` to the budget
    pub fn release(&self, bytes: usize) {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Bytes currently charged
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_release() {
        let budget = MemoryBudget::new(100);
        budget.charge(60).unwrap();
        assert_eq!(budget.used(), 60);
        budget.release(20);
        assert_eq!(budget.used(), 40);
    }

    #[test]
    fn test_exhaustion_is_a_typed_error() {
        let budget = MemoryBudget::new(100);
        budget.charge(90).unwrap();
        let err = budget.charge(20).unwrap_err();
        assert!(matches!(
            err,
            CacheError::AllocationFailure {
                requested: 20,
                used: 90,
                capacity: 100,
            }
        ));
        // failed charge leaves the accounting untouched
        assert_eq!(budget.used(), 90);
    }

    #[test]
    fn test_release_never_underflows() {
        let budget = MemoryBudget::new(100);
        budget.charge(10).unwrap();
        budget.release(50);
        assert_eq!(budget.used(), 0);
    }
}
