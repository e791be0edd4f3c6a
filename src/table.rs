//! Concurrent keyed element table
//!
//! One read-write lock protects the id map itself; every element is an
//! individually boxed `Arc` with its own mutex, so a map rehash triggered
//! by a concurrent insert can never move a payload out from under a caller
//! that is about to lock it. Lookups hand out clones of the handle, never
//! borrows into the map.
//!
//! The table lock is held only long enough to find or insert the handle;
//! payload work, including blocking backing-store round trips, happens
//! under the element's own lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{CacheError, Result};
use crate::types::ItemId;

/// A single table element: stable heap allocation with its own lock
#[derive(Debug)]
pub struct CacheElement<P> {
    /// Element id
    pub id: ItemId,
    payload: Mutex<P>,
}

impl<P> CacheElement<P> {
    fn new(id: ItemId, payload: P) -> Self {
        Self {
            id,
            payload: Mutex::new(payload),
        }
    }

    /// Lock the payload, blocking
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, P> {
        self.payload.lock()
    }

    /// Lock the payload without blocking
    pub fn try_lock(&self) -> Option<parking_lot::MutexGuard<'_, P>> {
        self.payload.try_lock()
    }
}

/// Factory producing a fresh payload for a lazily created element
pub type PayloadFactory<P> = Box<dyn Fn(ItemId) -> Result<P> + Send + Sync>;

/// Concurrent id to element map with per-element locking
pub struct CacheTable<P> {
    elems: RwLock<HashMap<ItemId, Arc<CacheElement<P>>>>,
    factory: PayloadFactory<P>,
}

impl<P> CacheTable<P> {
    /// Create an empty table with the given payload factory
    pub fn new(factory: PayloadFactory<P>) -> Self {
        Self {
            elems: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Number of elements in the table
    pub fn len(&self) -> usize {
        self.elems.read().len()
    }

    /// True when the table holds no elements
    pub fn is_empty(&self) -> bool {
        self.elems.read().is_empty()
    }

    /// Find an element, returning a clone of its handle
    pub fn lookup(&self, id: ItemId) -> Option<Arc<CacheElement<P>>> {
        self.elems.read().get(&id).cloned()
    }

    /// Create a new element, failing when the id is already present
    pub fn create(&self, id: ItemId) -> Result<Arc<CacheElement<P>>> {
        let mut elems = self.elems.write();
        if elems.contains_key(&id) {
            return Err(CacheError::AlreadyExists(id));
        }
        let payload = (self.factory)(id)?;
        let elem = Arc::new(CacheElement::new(id, payload));
        elems.insert(id, Arc::clone(&elem));
        Ok(elem)
    }

    /// Run `f` on the payload of an existing element
    ///
    /// The table lock is released before the element lock is taken, so `f`
    /// may block (on the backing store, say) without stalling the table.
    /// Fails with `NotFound` when the id was never created.
    pub fn process<R>(&self, id: ItemId, f: impl FnOnce(&mut P) -> R) -> Result<R> {
        let elem = self.lookup(id).ok_or(CacheError::NotFound(id))?;
        let mut payload = elem.lock();
        Ok(f(&mut payload))
    }

    /// Run `f` on the payload, creating the element when absent
    pub fn process_or_create<R>(&self, id: ItemId, f: impl FnOnce(&mut P) -> R) -> Result<R> {
        let elem = match self.lookup(id) {
            Some(elem) => elem,
            None => match self.create(id) {
                Ok(elem) => elem,
                // racing creator won, use theirs
                Err(CacheError::AlreadyExists(_)) => {
                    self.lookup(id).ok_or(CacheError::NotFound(id))?
                }
                Err(e) => return Err(e),
            },
        };
        let mut payload = elem.lock();
        Ok(f(&mut payload))
    }

    /// Evict elements the predicate marks, skipping busy ones
    ///
    /// Runs under the table write lock with a per-element try-lock: a
    /// marked element is flushed and removed in the same critical section,
    /// so a concurrent lookup or lazy create cannot reach an element whose
    /// payload the predicate has already flushed. A hot element whose lock
    /// is held simply survives the pass. Returns the number of elements
    /// removed.
    pub fn evict_where(&self, mut predicate: impl FnMut(ItemId, &mut P) -> bool) -> usize {
        let mut elems = self.elems.write();
        let before = elems.len();
        elems.retain(|id, elem| match elem.try_lock() {
            Some(mut payload) => !predicate(*id, &mut payload),
            None => true,
        });
        before - elems.len()
    }
}

impl<P> std::fmt::Debug for CacheTable<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTable")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CacheTable<Vec<u32>> {
        CacheTable::new(Box::new(|_| Ok(Vec::new())))
    }

    #[test]
    fn test_create_twice_fails() {
        let t = table();
        t.create(123).unwrap();
        let err = t.create(123).unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(123)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_process_requires_existing_element() {
        let t = table();
        let err = t.process(7, |_| ()).unwrap_err();
        assert!(matches!(err, CacheError::NotFound(7)));
    }

    #[test]
    fn test_process_propagates_callback_result() {
        let t = table();
        t.process_or_create(1, |v| v.push(42)).unwrap();
        let got = t.process(1, |v| v[0]).unwrap();
        assert_eq!(got, 42);
    }

    #[test]
    fn test_lookup_returns_stable_handle() {
        let t = table();
        let elem = t.create(5).unwrap();
        // handle stays usable regardless of later table growth
        for id in 100..200 {
            t.create(id).unwrap();
        }
        elem.lock().push(1);
        assert_eq!(t.process(5, |v| v.len()).unwrap(), 1);
    }

    #[test]
    fn test_evict_where_skips_locked_elements() {
        let t = table();
        t.process_or_create(1, |_| ()).unwrap();
        t.process_or_create(2, |_| ()).unwrap();

        let held = t.lookup(1).unwrap();
        let _guard = held.lock();

        let removed = t.evict_where(|_, _| true);
        assert_eq!(removed, 1);
        assert!(t.lookup(1).is_some());
        assert!(t.lookup(2).is_none());
    }
}
