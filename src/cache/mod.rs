//! Bounded in-memory caching.
//!
//! [`BoundedCache`] holds string-keyed values under a byte budget and evicts
//! in FIFO or LRU order, skipping pinned keys. It backs the operation log and
//! the message queue, and can serve as a memory-limited storage backend.

pub mod bounded;
pub mod size;

#[cfg(feature = "concurrency")]
pub use bounded::ConcurrentBoundedCache;
pub use bounded::{BoundedCache, CacheMetrics, EvictionCallback, EvictionPolicy, SetOutcome};
pub use size::{humanize_bytes, json_weight, megabytes_to_bytes};
