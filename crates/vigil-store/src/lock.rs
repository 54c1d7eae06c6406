// Per-key write locks closing the delete-then-insert visibility window.
//
// INVARIANTS:
// 1. The backing stores offer point operations without transactions; every
//    replace is a two-phase delete-then-insert
// 2. Writers AND point readers of the same key take the same lock, so a
//    reader can never land in the gap between the two phases
// 3. Locks are in-process; one process owns a store at a time

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Registry of one mutex per key, created on first use.
pub struct KeyLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        KeyLocks {
            locks: DashMap::new(),
        }
    }

    /// The lock guarding one key.
    pub fn for_key(&self, key: K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
