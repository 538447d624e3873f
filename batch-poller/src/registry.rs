//! Key-indexed listener registry with upsert semantics
//!
//! The registry holds at most one listener per key. Adding a listener for a key
//! that is already tracked replaces the previous listener outright. Removal works
//! either by key or by listener identity.
//!
//! The registry itself is not synchronized; the scheduler owns it behind its
//! state lock.

use std::collections::BTreeMap;

use crate::listener::{same_listener, SharedListener};
use crate::types::PollKey;

/// Registry mapping keys to their listeners
pub struct ListenerRegistry<K, M> {
    entries: BTreeMap<K, SharedListener<K, M>>,
}

impl<K: PollKey, M> ListenerRegistry<K, M> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the listener for its key
    ///
    /// # Returns
    /// * `Some(previous)` - The listener that was replaced
    /// * `None` - The key was not tracked before
    pub fn insert(&mut self, listener: SharedListener<K, M>) -> Option<SharedListener<K, M>> {
        self.entries.insert(listener.key(), listener)
    }

    /// Remove the listener registered under `key`
    pub fn remove_key(&mut self, key: &K) -> Option<SharedListener<K, M>> {
        self.entries.remove(key)
    }

    /// Remove `listener` if it is the exact instance currently registered
    ///
    /// A different listener registered under the same key is left in place.
    pub fn remove_listener(&mut self, listener: &SharedListener<K, M>) -> Option<SharedListener<K, M>> {
        self.remove_if_same(&listener.key(), listener)
    }

    /// Remove the entry for `key` only if it still holds `listener`
    pub fn remove_if_same(
        &mut self,
        key: &K,
        listener: &SharedListener<K, M>,
    ) -> Option<SharedListener<K, M>> {
        match self.entries.get(key) {
            Some(current) if same_listener(current, listener) => self.entries.remove(key),
            _ => None,
        }
    }

    /// Get the listener registered under `key`
    pub fn get(&self, key: &K) -> Option<&SharedListener<K, M>> {
        self.entries.get(key)
    }

    /// Check whether `key` is tracked
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Tracked keys in ascending order
    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    /// Copy of every entry, in key order, for use outside the owning lock
    pub fn snapshot(&self) -> Vec<(K, SharedListener<K, M>)> {
        self.entries
            .iter()
            .map(|(key, listener)| (key.clone(), listener.clone()))
            .collect()
    }

    /// Number of tracked listeners
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listener is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every listener
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: PollKey, M> Default for ListenerRegistry<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PollKey, M> std::fmt::Debug for ListenerRegistry<K, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn listener(key: u32) -> SharedListener<u32, String> {
        Arc::new(FnListener::new(key, |_: &String| true, |_: String| {}))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = ListenerRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.insert(listener(1)).is_none());
        assert!(registry.insert(listener(2)).is_none());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains_key(&1));
        assert!(registry.get(&2).is_some());
        assert_eq!(registry.keys(), vec![1, 2]);
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let mut registry = ListenerRegistry::new();
        let first = listener(1);
        let second = listener(1);

        registry.insert(first.clone());
        let replaced = registry.insert(second.clone()).unwrap();

        assert!(same_listener(&replaced, &first));
        assert_eq!(registry.len(), 1);
        assert!(same_listener(registry.get(&1).unwrap(), &second));
    }

    #[test]
    fn test_remove_by_key() {
        let mut registry = ListenerRegistry::new();
        registry.insert(listener(1));

        assert!(registry.remove_key(&1).is_some());
        assert!(registry.remove_key(&1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_by_identity_ignores_replacement() {
        let mut registry = ListenerRegistry::new();
        let stale = listener(1);
        let current = listener(1);

        registry.insert(stale.clone());
        registry.insert(current.clone());

        assert!(registry.remove_listener(&stale).is_none());
        assert!(registry.contains_key(&1));

        assert!(registry.remove_listener(&current).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_key_ordered() {
        let mut registry = ListenerRegistry::new();
        for key in [5, 3, 9, 1] {
            registry.insert(listener(key));
        }

        let keys: Vec<u32> = registry.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![1, 3, 5, 9]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16).prop_map(Op::Add),
            (0u8..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The registry tracks exactly the keys added and not yet removed.
        #[test]
        fn prop_registry_matches_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut registry = ListenerRegistry::new();
            let mut model = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Add(key) => {
                        registry.insert(listener(u32::from(key)));
                        model.insert(u32::from(key));
                    }
                    Op::Remove(key) => {
                        registry.remove_key(&u32::from(key));
                        model.remove(&u32::from(key));
                    }
                }

                prop_assert_eq!(registry.keys(), model.iter().copied().collect::<Vec<_>>());
            }
        }
    }
}
