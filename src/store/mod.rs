//! Storage backends.
//!
//! ## Key Components
//!
//! - [`BackendAdapter`]: the capability contract (`exists`, `set`, `get`,
//!   `delete`, `keys`) plus provided snapshot helpers.
//! - [`MemoryStore`]: unbounded ordered map, the default backend.
//! - [`Backend`]: closed set of backends a session binds to; custom adapters
//!   plug in through [`Backend::Custom`].
//!
//! `BoundedCache<Value>` also implements [`BackendAdapter`], giving a
//! memory-limited backend that drops entries under pressure.

pub mod backend;
pub mod memory;
pub mod traits;

pub use backend::Backend;
pub use memory::MemoryStore;
pub use traits::{parse_snapshot, BackendAdapter};
