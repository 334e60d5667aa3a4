//! Error types for the kvfacade library.
//!
//! ## Key Components
//!
//! - [`StorageError`]: Failures raised by backends and the facade's fallible
//!   internals. The facade's public verbs convert these into sentinel return
//!   values; version navigation surfaces them.
//! - [`VersionError`]: Returned when a requested version is not in the
//!   operation log.
//! - [`CacheError`]: Returned by [`BoundedCache`](crate::cache::BoundedCache)
//!   for caller errors such as deleting a missing key.
//! - [`CipherError`]: Returned when encrypting or decrypting a value fails.
//! - [`InvariantError`]: Returned when internal data-structure invariants are
//!   violated (`check_invariants` methods).
//! - [`ConfigError`]: Returned when configuration parameters are invalid
//!   (e.g. a negative memory limit).
//!
//! ## Example Usage
//!
//! ```
//! use kvfacade::builder::StorageConfig;
//!
//! let bad = StorageConfig::from_json(r#"{"log_limit_mb": -1.0}"#);
//! assert!(bad.unwrap_err().message().contains("log_limit_mb"));
//! ```

use std::io;

use thiserror::Error;

/// Result alias used across backends and the facade.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failure raised while reading or mutating a backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl From<CacheError> for StorageError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::MissingKey(key) => StorageError::KeyNotFound(key),
        }
    }
}

// ---------------------------------------------------------------------------
// VersionError
// ---------------------------------------------------------------------------

/// Error returned by operation-log navigation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("no such version: {0}")]
    UnknownVersion(String),
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by bounded-cache mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("key not found in cache: {0}")]
    MissingKey(String),
}

// ---------------------------------------------------------------------------
// CipherError
// ---------------------------------------------------------------------------

/// Error returned by [`Cipher`](crate::cipher::Cipher) implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("cipher has no private key")]
    MissingPrivateKey,

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal invariants are violated.
///
/// Produced by `check_invariants` methods on
/// [`BoundedCache`](crate::cache::BoundedCache) and
/// [`OperationLog`](crate::version::OperationLog). Carries a human-readable
/// description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvariantError {
    message: String,
}

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by [`StorageConfig::validate`](crate::builder::StorageConfig::validate)
/// and [`StorageBuilder::try_build`](crate::builder::StorageBuilder::try_build).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
