//! Storage backend contract.
//!
//! A backend owns keys and JSON values for one physical store. The facade
//! only relies on the five required verbs; bulk operations and snapshots are
//! provided on top of them and may be overridden when a store can do better.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, StorageError};

/// Capability contract every storage backend implements.
///
/// Calls are synchronous from the caller's point of view. `get` takes
/// `&mut self` so recency-tracking stores can record the access.
pub trait BackendAdapter: Send {
    /// Check if a key exists.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Insert or replace the value under `key`.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Fetch the value under `key`, `None` if absent.
    fn get(&mut self, key: &str) -> Result<Option<Value>>;

    /// Remove `key`. Missing keys are an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Keys matching a shell glob (`*`, `?`).
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove every key.
    fn clean(&mut self) -> Result<()> {
        for key in self.keys("*")? {
            self.delete(&key)?;
        }
        Ok(())
    }

    /// Serialize the whole keyspace as one JSON object.
    fn dumps(&mut self) -> Result<String> {
        let mut snapshot = Map::new();
        for key in self.keys("*")? {
            if let Some(value) = self.get(&key)? {
                snapshot.insert(key, value);
            }
        }
        Ok(serde_json::to_string(&Value::Object(snapshot))?)
    }

    /// Merge a JSON object snapshot into the store, key by key.
    fn loads(&mut self, snapshot: &str) -> Result<()> {
        for (key, value) in parse_snapshot(snapshot)? {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Write [`dumps`](Self::dumps) output to `path`.
    fn dump(&mut self, path: &Path) -> Result<()> {
        let snapshot = self.dumps()?;
        fs::write(path, snapshot)?;
        Ok(())
    }

    /// Merge the snapshot stored at `path`.
    fn load(&mut self, path: &Path) -> Result<()> {
        let snapshot = fs::read_to_string(path)?;
        self.loads(&snapshot)
    }
}

/// Parses a snapshot document; anything but a JSON object is rejected.
pub fn parse_snapshot(snapshot: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(snapshot)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::InvalidSnapshot(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
