//! Handle tables and deferred release
//!
//! Clients and rulesets are shared through `Arc`. A [`HandleTable`] hands
//! out opaque handles for them; [`DeferredRelease`] collects references
//! that were dropped while a list lock was held so that the final drop, and
//! whatever teardown it triggers, runs after the lock is gone.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use spin::{Mutex, RwLock};
use ssmon_api::{Error, Result};

/// Handle-keyed arena of shared objects
pub struct HandleTable<T> {
    entries: RwLock<HashMap<u64, Arc<T>>>,
    next: AtomicU64,
    step: u64,
}

impl<T> HandleTable<T> {
    /// Handles start at `step` and grow by `step`; zero is never issued
    pub fn new(step: u64) -> Self {
        let step = step.max(1);
        Self { entries: RwLock::new(HashMap::new()), next: AtomicU64::new(step), step }
    }

    pub fn insert(&self, object: Arc<T>) -> Result<u64> {
        self.insert_with(|_| object).map(|(handle, _)| handle)
    }

    /// Inserts an object that needs to know its own handle
    pub fn insert_with(&self, build: impl FnOnce(u64) -> Arc<T>) -> Result<(u64, Arc<T>)> {
        let handle = self.next.fetch_add(self.step, Ordering::Relaxed);
        let object = build(handle);
        let mut entries = self.entries.write();
        entries
            .try_reserve(1)
            .map_err(|_| Error::InsufficientResources("handle table"))?;
        entries.insert(handle, Arc::clone(&object));
        Ok((handle, object))
    }

    pub fn get(&self, handle: u64) -> Option<Arc<T>> {
        self.entries.read().get(&handle).cloned()
    }

    /// Unlinks the object; the caller owns the returned reference
    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        self.entries.write().remove(&handle)
    }

    /// Unlinks every object matching `predicate`
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        let mut entries = self.entries.write();
        let handles: Vec<u64> = entries
            .iter()
            .filter(|(_, object)| predicate(object))
            .map(|(handle, _)| *handle)
            .collect();
        handles.into_iter().filter_map(|handle| entries.remove(&handle)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// References whose release must wait until no list lock is held
pub struct DeferredRelease<T> {
    pending: Mutex<Vec<Arc<T>>>,
}

impl<T> DeferredRelease<T> {
    pub const fn new() -> Self {
        Self { pending: Mutex::new(Vec::new()) }
    }

    /// Queues `object`; if the queue cannot grow the reference is dropped
    /// in place
    pub fn push(&self, object: Arc<T>) {
        let mut pending = self.pending.lock();
        if pending.try_reserve(1).is_ok() {
            pending.push(object);
        } else {
            drop(pending);
            drop(object);
        }
    }

    /// Releases everything queued so far
    pub fn drain(&self) -> usize {
        let taken = core::mem::take(&mut *self.pending.lock());
        let count = taken.len();
        drop(taken);
        count
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DeferredRelease<T> {
    fn default() -> Self {
        Self::new()
    }
}
