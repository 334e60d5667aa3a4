//! Closed set of backends a storage session can bind to.
//!
//! Built-in stores get their own variant; anything else implementing
//! [`BackendAdapter`] goes through [`Backend::Custom`].

use std::fmt;

use serde_json::Value;

use crate::cache::{BoundedCache, EvictionPolicy};
use crate::error::Result;
use crate::store::memory::MemoryStore;
use crate::store::traits::BackendAdapter;

/// Backend selected at construction time.
pub enum Backend {
    /// Unbounded ordered map.
    Memory(MemoryStore),
    /// Byte-budgeted map that evicts under memory pressure.
    Bounded(BoundedCache<Value>),
    /// Caller-supplied adapter (database, object store, ...).
    Custom(Box<dyn BackendAdapter>),
}

impl Backend {
    pub fn memory() -> Self {
        Backend::Memory(MemoryStore::new())
    }

    /// Memory-limited backend with a budget in bytes (`0` = unbounded).
    pub fn bounded(max_bytes: usize, policy: EvictionPolicy) -> Self {
        Backend::Bounded(BoundedCache::new(max_bytes, policy))
    }

    pub fn custom(adapter: impl BackendAdapter + 'static) -> Self {
        Backend::Custom(Box::new(adapter))
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Bounded(_) => "bounded",
            Backend::Custom(_) => "custom",
        }
    }

    fn adapter(&self) -> &dyn BackendAdapter {
        match self {
            Backend::Memory(store) => store,
            Backend::Bounded(cache) => cache,
            Backend::Custom(adapter) => adapter.as_ref(),
        }
    }

    fn adapter_mut(&mut self) -> &mut dyn BackendAdapter {
        match self {
            Backend::Memory(store) => store,
            Backend::Bounded(cache) => cache,
            Backend::Custom(adapter) => adapter.as_mut(),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::memory()
    }
}

impl From<MemoryStore> for Backend {
    fn from(store: MemoryStore) -> Self {
        Backend::Memory(store)
    }
}

impl From<BoundedCache<Value>> for Backend {
    fn from(cache: BoundedCache<Value>) -> Self {
        Backend::Bounded(cache)
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory(store) => f.debug_tuple("Memory").field(store).finish(),
            Backend::Bounded(cache) => f.debug_tuple("Bounded").field(cache).finish(),
            Backend::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BackendAdapter for Backend {
    fn exists(&self, key: &str) -> Result<bool> {
        self.adapter().exists(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.adapter_mut().set(key, value)
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.adapter_mut().get(key)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.adapter_mut().delete(key)
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.adapter().keys(pattern)
    }

    fn clean(&mut self) -> Result<()> {
        self.adapter_mut().clean()
    }

    fn dumps(&mut self) -> Result<String> {
        self.adapter_mut().dumps()
    }

    fn loads(&mut self, snapshot: &str) -> Result<()> {
        self.adapter_mut().loads(snapshot)
    }
}

/// Memory-limited backend: evicted keys simply disappear from the store.
impl BackendAdapter for BoundedCache<Value> {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        BoundedCache::set(self, key, value);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(BoundedCache::get(self, key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        BoundedCache::delete(self, key)?;
        Ok(())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(BoundedCache::keys(self, pattern))
    }

    fn clean(&mut self) -> Result<()> {
        self.clear();
        Ok(())
    }
}
