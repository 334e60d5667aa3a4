//! Byte-budgeted key/value cache with FIFO or LRU eviction.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                       BoundedCache<V, F>                         │
//!   │                                                                  │
//!   │   FxHashMap<String, CacheEntry<V>>                               │
//!   │     key ──► { value, bytes, slot } ─────────────┐                │
//!   │                                                 ▼                │
//!   │   OrderList<String>                                              │
//!   │     head (oldest) ─► [k1] ◄──► [k2] ◄──► [k3] ◄── tail (newest)  │
//!   │                                                                  │
//!   │   pinned: FxHashSet<String>     total_bytes / max_bytes          │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! | Call          | FIFO                 | LRU                  |
//! |---------------|----------------------|----------------------|
//! | `set` (new)   | append at tail       | append at tail       |
//! | `set` (exist) | move to tail         | move to tail         |
//! | `get`         | unchanged            | move to tail         |
//! | `peek`        | unchanged            | unchanged            |
//!
//! ## Eviction
//!
//! After every `set` the sweep walks the order list from the head and evicts
//! the first unpinned key until the tracked total fits the budget. When only
//! pinned keys remain the sweep stops and the budget stays exceeded. A budget
//! of `0` disables eviction.
//!
//! ## Thread Safety
//!
//! `BoundedCache` is single-threaded. [`ConcurrentBoundedCache`] (feature
//! `concurrency`) wraps it in a `parking_lot::RwLock`.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cache::size::{humanize_bytes, json_weight, megabytes_to_bytes};
use crate::ds::{OrderList, OrderSlot};
use crate::error::{CacheError, InvariantError};
use crate::glob::Glob;

/// Callback invoked with the key and value of every evicted entry.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send + Sync>;

/// Eviction order of a [`BoundedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Reads refresh recency; the least recently used key is evicted first.
    #[default]
    Lru,
    /// Reads never reorder; the oldest written key is evicted first.
    Fifo,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub evictions: u64,
}

/// Result of [`BoundedCache::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome<V> {
    /// Value previously stored under the key.
    pub previous: Option<V>,
    /// Keys evicted by the sweep that followed the write, oldest first.
    pub evicted: Vec<String>,
}

struct CacheEntry<V> {
    value: V,
    bytes: usize,
    slot: OrderSlot,
}

/// In-memory map with a byte budget, pinned keys and an eviction callback.
///
/// The size of an entry is `key.len() + weigher(value)`. The default weigher
/// is the length of the value's compact JSON encoding.
///
/// # Example
///
/// ```
/// use kvfacade::cache::{BoundedCache, EvictionPolicy};
/// use serde_json::json;
///
/// let mut cache = BoundedCache::new(64, EvictionPolicy::Lru);
/// cache.set("a", json!({"n": 1}));
/// assert_eq!(cache.get("a"), Some(&json!({"n": 1})));
/// assert!(cache.bytes_used() <= 64);
/// ```
pub struct BoundedCache<V, F = fn(&V) -> usize> {
    entries: FxHashMap<String, CacheEntry<V>>,
    order: OrderList<String>,
    pinned: FxHashSet<String>,
    policy: EvictionPolicy,
    max_bytes: usize,
    total_bytes: usize,
    weigher: F,
    on_evict: Option<EvictionCallback<V>>,
    metrics: CacheMetrics,
}

impl<V: Serialize> BoundedCache<V> {
    /// Creates a cache that weighs values by their JSON encoding.
    ///
    /// A `max_bytes` of `0` disables eviction.
    pub fn new(max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self::with_weigher(max_bytes, policy, json_weight::<V>)
    }

    /// Creates a cache with a budget expressed in megabytes.
    pub fn with_megabytes(max_mb: f64, policy: EvictionPolicy) -> Self {
        Self::new(megabytes_to_bytes(max_mb), policy)
    }
}

impl<V, F> BoundedCache<V, F>
where
    F: Fn(&V) -> usize,
{
    /// Creates a cache with a custom value weigher.
    pub fn with_weigher(max_bytes: usize, policy: EvictionPolicy, weigher: F) -> Self {
        Self {
            entries: FxHashMap::default(),
            order: OrderList::new(),
            pinned: FxHashSet::default(),
            policy,
            max_bytes,
            total_bytes: 0,
            weigher,
            on_evict: None,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Configured budget in bytes; `0` means unbounded.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    /// Registers the callback fired for each evicted entry, replacing any
    /// previous one.
    pub fn set_on_evict<C>(&mut self, callback: C)
    where
        C: FnMut(&str, &V) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(callback));
    }

    /// Exempts `key` from eviction. The key does not need to exist yet.
    pub fn pin(&mut self, key: impl Into<String>) {
        self.pinned.insert(key.into());
    }

    /// Makes `key` evictable again. Returns `true` if it was pinned.
    ///
    /// The budget is enforced again by the next `set`.
    pub fn unpin(&mut self, key: &str) -> bool {
        self.pinned.remove(key)
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains(key)
    }

    /// Stores `value` under `key`, marks it newest and runs the eviction sweep.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> SetOutcome<V> {
        let key = key.into();
        let bytes = self.entry_bytes(&key, &value);

        let previous = match self.entries.get_mut(&key) {
            Some(entry) => {
                self.total_bytes = self.total_bytes.saturating_sub(entry.bytes) + bytes;
                entry.bytes = bytes;
                self.order.move_to_back(entry.slot);
                self.metrics.updates += 1;
                Some(std::mem::replace(&mut entry.value, value))
            },
            None => {
                let slot = self.order.push_back(key.clone());
                self.entries.insert(key, CacheEntry { value, bytes, slot });
                self.total_bytes += bytes;
                self.metrics.inserts += 1;
                None
            },
        };

        let evicted = self.evict_over_budget();

        #[cfg(debug_assertions)]
        self.debug_validate_invariants();

        SetOutcome { previous, evicted }
    }

    /// Returns the value for `key`; under LRU the key becomes most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.metrics.hits += 1;
                if self.policy == EvictionPolicy::Lru {
                    self.order.move_to_back(entry.slot);
                }
                Some(&entry.value)
            },
            None => {
                self.metrics.misses += 1;
                None
            },
        }
    }

    /// Reads `key` without touching order or counters.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Removes `key` and returns its value.
    pub fn delete(&mut self, key: &str) -> Result<V, CacheError> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::MissingKey(key.to_string()))?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.bytes);
        self.order.remove(entry.slot);
        self.metrics.removes += 1;
        Ok(entry.value)
    }

    /// Keys matching a shell glob, oldest first.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let glob = Glob::new(pattern);
        self.order
            .iter()
            .filter(|key| glob.matches(key))
            .cloned()
            .collect()
    }

    /// Iterates `(key, value)` pairs oldest first without touching order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.order.iter().filter_map(move |key| {
            self.entries
                .get(key)
                .map(|entry| (key.as_str(), &entry.value))
        })
    }

    /// Removes every entry. Pins are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_bytes = 0;
    }

    /// Tracked byte total.
    pub fn bytes_used(&self) -> usize {
        self.total_bytes
    }

    /// Byte total recomputed from every stored entry.
    pub fn deep_bytes_used(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, entry)| self.entry_bytes(key, &entry.value))
            .sum()
    }

    /// Tracked byte total formatted as `"12.3 KB"`.
    pub fn bytes_used_human(&self) -> String {
        humanize_bytes(self.total_bytes)
    }

    /// Verifies that bookkeeping agrees with the stored entries.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let summed: usize = self.entries.values().map(|entry| entry.bytes).sum();
        if summed != self.total_bytes {
            return Err(InvariantError::new(format!(
                "tracked total {} != sum of entry sizes {}",
                self.total_bytes, summed
            )));
        }
        if self.order.len() != self.entries.len() {
            return Err(InvariantError::new(format!(
                "order length {} != entry count {}",
                self.order.len(),
                self.entries.len()
            )));
        }
        for (key, entry) in &self.entries {
            if self.order.get(entry.slot) != Some(key) {
                return Err(InvariantError::new(format!(
                    "order slot for {key} names another key"
                )));
            }
        }
        if self.max_bytes > 0
            && self.total_bytes > self.max_bytes
            && self.entries.keys().any(|key| !self.pinned.contains(key))
        {
            return Err(InvariantError::new(format!(
                "{} bytes exceeds budget {} with unpinned keys left",
                self.total_bytes, self.max_bytes
            )));
        }
        Ok(())
    }

    fn entry_bytes(&self, key: &str, value: &V) -> usize {
        key.len() + (self.weigher)(value)
    }

    fn evict_over_budget(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        if self.max_bytes == 0 {
            return evicted;
        }

        while self.total_bytes > self.max_bytes {
            let Some(victim) = self
                .order
                .iter()
                .find(|key| !self.pinned.contains(key.as_str()))
                .cloned()
            else {
                break;
            };

            if let (Some(callback), Some(entry)) =
                (self.on_evict.as_mut(), self.entries.get(&victim))
            {
                callback(victim.as_str(), &entry.value);
            }

            let Some(entry) = self.entries.remove(&victim) else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(entry.bytes);
            self.order.remove(entry.slot);
            self.metrics.evictions += 1;
            tracing::trace!(key = %victim, bytes = entry.bytes, "evicted cache entry");
            evicted.push(victim);
        }

        evicted
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.order.debug_validate_invariants();
        if let Err(err) = self.check_invariants() {
            panic!("bounded cache invariant violated: {err}");
        }
    }
}

impl<V, F> fmt::Debug for BoundedCache<V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("policy", &self.policy)
            .field("bytes_used", &self.total_bytes)
            .field("max_bytes", &self.max_bytes)
            .field("pinned", &self.pinned.len())
            .finish()
    }
}

#[cfg(feature = "concurrency")]
pub use concurrent::ConcurrentBoundedCache;

#[cfg(feature = "concurrency")]
mod concurrent {
    use parking_lot::RwLock;
    use serde::Serialize;

    use super::{BoundedCache, CacheMetrics, EvictionPolicy, SetOutcome};
    use crate::error::CacheError;

    /// Thread-safe [`BoundedCache`] guarded by a `parking_lot::RwLock`.
    ///
    /// `get` takes the write lock because LRU reads reorder entries; `peek`
    /// only needs the read lock.
    pub struct ConcurrentBoundedCache<V, F = fn(&V) -> usize> {
        inner: RwLock<BoundedCache<V, F>>,
    }

    impl<V: Serialize> ConcurrentBoundedCache<V> {
        pub fn new(max_bytes: usize, policy: EvictionPolicy) -> Self {
            Self {
                inner: RwLock::new(BoundedCache::new(max_bytes, policy)),
            }
        }
    }

    impl<V, F> ConcurrentBoundedCache<V, F>
    where
        V: Clone,
        F: Fn(&V) -> usize,
    {
        pub fn from_cache(cache: BoundedCache<V, F>) -> Self {
            Self {
                inner: RwLock::new(cache),
            }
        }

        pub fn set(&self, key: impl Into<String>, value: V) -> SetOutcome<V> {
            self.inner.write().set(key, value)
        }

        pub fn get(&self, key: &str) -> Option<V> {
            self.inner.write().get(key).cloned()
        }

        pub fn peek(&self, key: &str) -> Option<V> {
            self.inner.read().peek(key).cloned()
        }

        pub fn delete(&self, key: &str) -> Result<V, CacheError> {
            self.inner.write().delete(key)
        }

        pub fn contains(&self, key: &str) -> bool {
            self.inner.read().contains(key)
        }

        pub fn keys(&self, pattern: &str) -> Vec<String> {
            self.inner.read().keys(pattern)
        }

        pub fn pin(&self, key: impl Into<String>) {
            self.inner.write().pin(key);
        }

        pub fn unpin(&self, key: &str) -> bool {
            self.inner.write().unpin(key)
        }

        pub fn len(&self) -> usize {
            self.inner.read().len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.read().is_empty()
        }

        pub fn bytes_used(&self) -> usize {
            self.inner.read().bytes_used()
        }

        pub fn metrics(&self) -> CacheMetrics {
            self.inner.read().metrics()
        }

        /// Runs `f` with exclusive access to the underlying cache.
        pub fn with_cache<R>(&self, f: impl FnOnce(&mut BoundedCache<V, F>) -> R) -> R {
            let mut guard = self.inner.write();
            f(&mut guard)
        }
    }
}
