// Per-run memo of validator address -> row id.
//
// Deliberately not process-global: a cache is created for one sync or
// scoring run and dropped with it, so resets or re-imports between runs can
// never serve stale ids.

use std::collections::HashMap;

use vigil_core::Address;

#[derive(Debug, Default)]
pub struct ValidatorIdCache {
    ids: HashMap<Address, u64>,
}

impl ValidatorIdCache {
    pub fn new() -> Self {
        ValidatorIdCache::default()
    }

    pub fn get(&self, address: &str) -> Option<u64> {
        self.ids.get(address).copied()
    }

    pub fn put(&mut self, address: Address, id: u64) {
        self.ids.insert(address, id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memoizes_per_run() {
        let mut cache = ValidatorIdCache::new();
        assert!(cache.get("0xaa").is_none());

        cache.put("0xaa".to_string(), 3);
        assert_eq!(cache.get("0xaa"), Some(3));
        assert_eq!(cache.len(), 1);
    }
}
