// In-memory backend for tests and ephemeral runs.
//
// Mirrors the persistent backend's shape: point operations without a
// transaction, replaces done in two phases under the key lock. Readers of
// the same key take the same lock (see lock.rs).

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use vigil_core::{Address, EpochActivity, EpochsActivities, ScoreValues};

use crate::cache::ValidatorIdCache;
use crate::error::StoreError;
use crate::lock::KeyLocks;
use crate::traits::{ActivityStore, ScoreStore};

#[derive(Default)]
struct Tables {
    activity: BTreeMap<u64, EpochActivity>,
    validators_by_address: BTreeMap<Address, u64>,
    validators_by_id: BTreeMap<u64, Address>,
    next_validator_id: u64,
    scores: BTreeMap<(u64, u64, u64), ScoreValues>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    epoch_locks: KeyLocks<u64>,
    score_locks: KeyLocks<(u64, u64, u64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            tables: RwLock::new(Tables {
                next_validator_id: 1,
                ..Tables::default()
            }),
            epoch_locks: KeyLocks::new(),
            score_locks: KeyLocks::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityStore for MemoryStore {
    fn replace_epoch(&self, epoch: u64, activity: &EpochActivity) -> Result<(), StoreError> {
        let lock = self.epoch_locks.for_key(epoch);
        let _guard = lock.lock();

        // two separate table borrows on purpose: the gap between the phases
        // is what the key lock exists to cover
        self.tables.write().activity.remove(&epoch);
        self.tables.write().activity.insert(epoch, activity.clone());
        Ok(())
    }

    fn epoch_activity(&self, epoch: u64) -> Result<Option<EpochActivity>, StoreError> {
        let lock = self.epoch_locks.for_key(epoch);
        let _guard = lock.lock();
        Ok(self
            .tables
            .read()
            .activity
            .get(&epoch)
            .filter(|rows| !rows.is_empty())
            .cloned())
    }

    fn epochs_with_activity(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<BTreeSet<u64>, StoreError> {
        Ok(self
            .tables
            .read()
            .activity
            .range(from_epoch..=to_epoch)
            .filter(|(_, map)| !map.is_empty())
            .map(|(epoch, _)| *epoch)
            .collect())
    }

    fn activities_between(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<EpochsActivities, StoreError> {
        Ok(self
            .tables
            .read()
            .activity
            .range(from_epoch..=to_epoch)
            .map(|(epoch, map)| (*epoch, map.clone()))
            .collect())
    }

    fn delete_epochs(&self, from_epoch: u64, to_epoch: u64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        let doomed: Vec<u64> = tables
            .activity
            .range(from_epoch..=to_epoch)
            .map(|(epoch, _)| *epoch)
            .collect();
        let mut rows = 0;
        for epoch in doomed {
            if let Some(map) = tables.activity.remove(&epoch) {
                rows += map.len() as u64;
            }
        }
        Ok(rows)
    }
}

impl ScoreStore for MemoryStore {
    fn validator_id(
        &self,
        address: &str,
        cache: &mut ValidatorIdCache,
    ) -> Result<u64, StoreError> {
        if let Some(id) = cache.get(address) {
            return Ok(id);
        }

        let mut tables = self.tables.write();
        let id = match tables.validators_by_address.get(address) {
            Some(id) => *id,
            None => {
                let id = tables.next_validator_id;
                tables.next_validator_id += 1;
                tables.validators_by_address.insert(address.to_string(), id);
                tables.validators_by_id.insert(id, address.to_string());
                id
            }
        };
        cache.put(address.to_string(), id);
        Ok(id)
    }

    fn validator_address(&self, id: u64) -> Result<Option<Address>, StoreError> {
        Ok(self.tables.read().validators_by_id.get(&id).cloned())
    }

    fn replace_score(
        &self,
        validator_id: u64,
        from_epoch: u64,
        to_epoch: u64,
        scores: &ScoreValues,
    ) -> Result<(), StoreError> {
        let key = (validator_id, from_epoch, to_epoch);
        let lock = self.score_locks.for_key(key);
        let _guard = lock.lock();

        self.tables.write().scores.remove(&key);
        self.tables.write().scores.insert(key, *scores);
        Ok(())
    }

    fn score(
        &self,
        validator_id: u64,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<Option<ScoreValues>, StoreError> {
        let key = (validator_id, from_epoch, to_epoch);
        let lock = self.score_locks.for_key(key);
        let _guard = lock.lock();
        Ok(self.tables.read().scores.get(&key).copied())
    }

    fn delete_scores(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        let rows = tables.scores.len() as u64;
        tables.scores.clear();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::ValidatorActivity;

    fn epoch_set(addresses: &[&str]) -> EpochActivity {
        addresses
            .iter()
            .map(|a| (a.to_string(), ValidatorActivity::elected(0.5)))
            .collect()
    }

    #[test]
    fn test_replace_epoch_is_wholesale() {
        let store = MemoryStore::new();
        store.replace_epoch(5, &epoch_set(&["0xaa", "0xbb"])).unwrap();
        store.replace_epoch(5, &epoch_set(&["0xcc"])).unwrap();

        let rows = store.epoch_activity(5).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.contains_key("0xcc"));
    }

    #[test]
    fn test_epochs_with_activity_bounds() {
        let store = MemoryStore::new();
        for epoch in [3u64, 4, 7] {
            store.replace_epoch(epoch, &epoch_set(&["0xaa"])).unwrap();
        }

        let synced = store.epochs_with_activity(1, 10).unwrap();
        assert_eq!(synced.into_iter().collect::<Vec<_>>(), vec![3, 4, 7]);
        let synced = store.epochs_with_activity(4, 6).unwrap();
        assert_eq!(synced.into_iter().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_validator_ids_are_stable() {
        let store = MemoryStore::new();
        let mut cache = ValidatorIdCache::new();

        let first = store.validator_id("0xaa", &mut cache).unwrap();
        let second = store.validator_id("0xbb", &mut cache).unwrap();
        assert_ne!(first, second);

        // same address resolves to the same id, cached or not
        let mut fresh = ValidatorIdCache::new();
        assert_eq!(store.validator_id("0xaa", &mut fresh).unwrap(), first);
        assert_eq!(store.validator_address(first).unwrap().as_deref(), Some("0xaa"));
    }

    #[test]
    fn test_score_windows_coexist() {
        let store = MemoryStore::new();
        let narrow = ScoreValues::compose(1.0, 0.9, 0.8);
        let wide = ScoreValues::compose(1.0, 0.5, 0.4);

        store.replace_score(1, 10, 12, &narrow).unwrap();
        store.replace_score(1, 1, 12, &wide).unwrap();

        assert_eq!(store.score(1, 10, 12).unwrap(), Some(narrow));
        assert_eq!(store.score(1, 1, 12).unwrap(), Some(wide));
        assert_eq!(store.score(1, 2, 12).unwrap(), None);
    }

    #[test]
    fn test_delete_epochs_counts_rows() {
        let store = MemoryStore::new();
        store.replace_epoch(1, &epoch_set(&["0xaa", "0xbb"])).unwrap();
        store.replace_epoch(2, &epoch_set(&["0xaa"])).unwrap();
        store.replace_epoch(9, &epoch_set(&["0xaa"])).unwrap();

        assert_eq!(store.delete_epochs(1, 5).unwrap(), 3);
        assert!(store.epoch_activity(1).unwrap().is_none());
        assert!(store.epoch_activity(9).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_epoch() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let store = MemoryStore::new();
        let set_a = epoch_set(&["0xaa", "0xbb"]);
        let set_b = epoch_set(&["0xcc", "0xdd"]);
        store.replace_epoch(7, &set_a).unwrap();

        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..500 {
                    let set = if round % 2 == 0 { &set_b } else { &set_a };
                    store.replace_epoch(7, set).unwrap();
                }
                done.store(true, Ordering::Release);
            });

            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let rows = store.epoch_activity(7).unwrap();
                    // the key lock guarantees a full set, never the gap
                    // between delete and insert
                    let rows = rows.expect("epoch must never read back empty");
                    assert_eq!(rows.len(), 2);
                }
            });
        });
    }
}
