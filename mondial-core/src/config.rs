//! Loader configuration.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, MondialResult};

/// Default number of keys dispatched in one batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// Default number of sub-batches executed concurrently per dispatch.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

/// Configuration for a batch loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Maximum number of distinct keys per executor call.
    pub max_batch_size: usize,
    /// Whether loads are memoised in the request-scoped cache.
    pub caching_enabled: bool,
    /// Upper bound on sub-batches in flight during one dispatch.
    pub max_concurrent_batches: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            caching_enabled: true,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    pub fn with_max_concurrent_batches(mut self, limit: usize) -> Self {
        self.max_concurrent_batches = limit;
        self
    }

    /// Reject sizes that would make dispatch impossible.
    pub fn validate(&self) -> MondialResult<()> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_batch_size".to_string(),
                value: self.max_batch_size.to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_batches".to_string(),
                value: self.max_concurrent_batches.to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `MONDIAL_LOADER_MAX_BATCH_SIZE`: keys per batch (default: 10)
    /// - `MONDIAL_LOADER_CACHING`: `true`/`false` (default: true)
    /// - `MONDIAL_LOADER_MAX_CONCURRENT_BATCHES`: sub-batches in flight (default: 4)
    ///
    /// A variable that is set but unparseable is an error, not a fallback.
    pub fn from_env() -> MondialResult<Self> {
        let defaults = Self::default();

        let config = Self {
            max_batch_size: env_parse("MONDIAL_LOADER_MAX_BATCH_SIZE")?
                .unwrap_or(defaults.max_batch_size),
            caching_enabled: env_parse("MONDIAL_LOADER_CACHING")?
                .unwrap_or(defaults.caching_enabled),
            max_concurrent_batches: env_parse("MONDIAL_LOADER_MAX_CONCURRENT_BATCHES")?
                .unwrap_or(defaults.max_concurrent_batches),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Read and parse an optional environment variable.
pub fn env_parse<T: std::str::FromStr>(var: &str) -> MondialResult<Option<T>> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidValue {
                field: var.to_string(),
                value: raw.clone(),
                reason: format!("cannot parse as {}", std::any::type_name::<T>()),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}
