pub use crate::builder::{StorageBuilder, StorageConfig};
pub use crate::cache::{BoundedCache, CacheMetrics, EvictionPolicy, SetOutcome};
#[cfg(feature = "concurrency")]
pub use crate::cache::ConcurrentBoundedCache;
pub use crate::cipher::{Cipher, RsaChunkCipher};
pub use crate::error::{
    CacheError, CipherError, ConfigError, InvariantError, StorageError, VersionError,
};
pub use crate::events::EventBus;
pub use crate::facade::{SharedStorage, SingletonKeyValueStorage, Slave, DEFAULT_SLAVE_VERBS};
pub use crate::queue::{MessageQueue, QueueEvent};
pub use crate::store::{Backend, BackendAdapter, MemoryStore};
pub use crate::version::{Operation, OperationLog, Verb, VersionId};
