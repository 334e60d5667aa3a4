//! Storage configuration and builder.
//!
//! [`StorageConfig`] holds the serializable knobs of a session; the builder
//! adds the parts that cannot be serialized (backend, cipher).
//!
//! ## Example
//!
//! ```rust
//! use kvfacade::builder::StorageBuilder;
//! use kvfacade::cache::EvictionPolicy;
//! use kvfacade::store::Backend;
//! use serde_json::json;
//!
//! let mut storage = StorageBuilder::new()
//!     .backend(Backend::bounded(1024 * 1024, EvictionPolicy::Lru))
//!     .log_limit_mb(16.0)
//!     .build();
//! assert!(storage.set("alpha", json!({"n": 1})));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{megabytes_to_bytes, EvictionPolicy};
use crate::cipher::Cipher;
use crate::error::ConfigError;
use crate::facade::SingletonKeyValueStorage;
use crate::store::Backend;
use crate::version::OperationLog;

/// Serializable session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Record every write in the operation log.
    pub version_control: bool,
    /// Memory budget of the operation log in megabytes; `0` = unbounded.
    pub log_limit_mb: f64,
    /// Which records the operation log drops first when over budget.
    pub log_policy: EvictionPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            version_control: true,
            log_limit_mb: 128.0,
            log_policy: EvictionPolicy::Fifo,
        }
    }
}

impl StorageConfig {
    /// Parses and validates a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| ConfigError::new(format!("invalid storage config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.log_limit_mb.is_finite() || self.log_limit_mb < 0.0 {
            return Err(ConfigError::new(format!(
                "log_limit_mb must be a finite non-negative number, got {}",
                self.log_limit_mb
            )));
        }
        Ok(())
    }

    pub fn log_limit_bytes(&self) -> usize {
        megabytes_to_bytes(self.log_limit_mb)
    }
}

/// Builder for [`SingletonKeyValueStorage`].
#[derive(Default)]
pub struct StorageBuilder {
    config: StorageConfig,
    backend: Option<Backend>,
    cipher: Option<Box<dyn Cipher>>,
}

impl StorageBuilder {
    /// Builder with the default configuration and an in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: StorageConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn version_control(mut self, enabled: bool) -> Self {
        self.config.version_control = enabled;
        self
    }

    pub fn log_limit_mb(mut self, limit_mb: f64) -> Self {
        self.config.log_limit_mb = limit_mb;
        self
    }

    pub fn log_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.log_policy = policy;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Encrypt every stored value with `cipher`.
    pub fn cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Some(Box::new(cipher));
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Validates the configuration, then builds.
    pub fn try_build(self) -> Result<SingletonKeyValueStorage, ConfigError> {
        self.config.validate()?;
        Ok(self.build())
    }

    /// Builds without validating; an unusable log limit means unbounded.
    pub fn build(self) -> SingletonKeyValueStorage {
        let log = OperationLog::new(self.config.log_limit_bytes(), self.config.log_policy);
        SingletonKeyValueStorage::from_parts(
            self.backend.unwrap_or_default(),
            log,
            self.config.version_control,
            self.cipher,
        )
    }
}

impl fmt::Debug for StorageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBuilder")
            .field("config", &self.config)
            .field("backend", &self.backend.as_ref().map(Backend::kind))
            .field("cipher", &self.cipher.is_some())
            .finish()
    }
}
