//! Unbounded in-memory store.
//!
//! Keys live in a `BTreeMap`, so listings and snapshots come out sorted.
//! This is the default backend of a fresh storage session.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, StorageError};
use crate::glob::Glob;
use crate::store::traits::BackendAdapter;

/// Ordered map of keys to JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow a value without going through the backend contract.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

impl FromIterator<(String, Value)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl BackendAdapter for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries
            .remove(key)
            .map(drop)
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = Glob::new(pattern);
        Ok(self
            .entries
            .keys()
            .filter(|key| glob.matches(key))
            .cloned()
            .collect())
    }

    fn clean(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_verbs() {
        let mut store = MemoryStore::new();
        assert!(!store.exists("a").unwrap());
        store.set("a", json!({"x": 1})).unwrap();
        assert!(store.exists("a").unwrap());
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1})));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn delete_missing_key_fails() {
        let mut store = MemoryStore::new();
        let err = store.delete("ghost").unwrap_err();
        assert!(matches!(err, StorageError::KeyNotFound(ref k) if k == "ghost"));
    }

    #[test]
    fn keys_are_sorted_and_filtered() {
        let mut store = MemoryStore::new();
        for key in ["gamma", "alpha", "abeta"] {
            store.set(key, json!(null)).unwrap();
        }
        assert_eq!(store.keys("a*").unwrap(), vec!["abeta", "alpha"]);
        assert_eq!(store.keys("*").unwrap().len(), 3);
    }

    #[test]
    fn dumps_and_loads_round_trip() {
        let mut store = MemoryStore::new();
        store.set("k1", json!({"v": 1})).unwrap();
        store.set("k2", json!({"v": [1, 2]})).unwrap();
        let snapshot = store.dumps().unwrap();

        let mut restored = MemoryStore::new();
        restored.loads(&snapshot).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn loads_merges_into_existing_keys() {
        let mut store = MemoryStore::new();
        store.set("keep", json!(1)).unwrap();
        store.loads(r#"{"new": 2}"#).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn dump_and_load_use_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut store = MemoryStore::new();
        store.set("a", json!({"n": 1})).unwrap();
        store.dump(&path).unwrap();

        let mut restored = MemoryStore::new();
        restored.load(&path).unwrap();
        assert_eq!(restored.peek("a"), Some(&json!({"n": 1})));
    }

    #[test]
    fn clean_empties_store() {
        let mut store: MemoryStore = [("a".to_string(), json!(1))].into_iter().collect();
        store.clean().unwrap();
        assert!(store.is_empty());
    }
}
