//! kvfacade: backend-agnostic key-value storage with bounded caching,
//! undo/redo history, replication hooks and value encryption.
//!
//! The entry point is [`SingletonKeyValueStorage`], a session bound to one
//! [`Backend`](store::Backend). Write verbs return `bool`, read verbs return
//! `Option`, and version navigation returns [`Result`].

pub mod builder;
pub mod cache;
pub mod cipher;
pub mod ds;
pub mod error;
pub mod events;
pub mod facade;
pub mod glob;
pub mod prelude;
pub mod queue;
pub mod store;
pub mod version;

pub use error::{Result, StorageError};
pub use facade::{SharedStorage, SingletonKeyValueStorage, Slave};
