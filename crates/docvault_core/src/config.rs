//! Store configuration.

use crate::error::{CoreError, CoreResult};
use docvault_storage::EncryptionKey;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for connecting a [`StorageEngine`](crate::StorageEngine).
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one subdirectory per collection.
    pub data_dir: PathBuf,

    /// Optional directory of user assets included in backups.
    pub assets_dir: Option<PathBuf>,

    /// Read cache settings.
    pub cache: CacheConfig,

    /// Compression, batching and admission settings.
    pub performance: PerformanceConfig,

    /// Encryption at rest.
    pub encryption: EncryptionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            assets_dir: None,
            cache: CacheConfig::default(),
            performance: PerformanceConfig::default(),
            encryption: EncryptionConfig::default(),
        }
    }
}

impl Config {
    /// Creates a configuration with default values rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Sets the assets directory.
    #[must_use]
    pub fn assets_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(path.into());
        self
    }

    /// Replaces the cache settings.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the performance settings.
    #[must_use]
    pub fn performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }

    /// Enables encryption with the given key.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption = EncryptionConfig::with_key(key);
        self
    }

    /// Enables or disables compression of stored documents.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.performance.enable_compression = enabled;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> CoreResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::invalid_config("data_dir must not be empty"));
        }
        if self.performance.max_concurrent_operations == 0 {
            return Err(CoreError::invalid_config(
                "max_concurrent_operations must be at least 1",
            ));
        }
        if self.performance.batch_size == 0 {
            return Err(CoreError::invalid_config("batch_size must be at least 1"));
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(CoreError::invalid_config(
                "cache max_size must be at least 1 when the cache is enabled",
            ));
        }
        if self.encryption.enabled && self.encryption.key.is_none() {
            return Err(CoreError::invalid_config(
                "encryption is enabled but no key was supplied",
            ));
        }
        if let Some(assets) = &self.assets_dir {
            if assets == &self.data_dir {
                return Err(CoreError::invalid_config(
                    "assets_dir must differ from data_dir",
                ));
            }
        }
        Ok(())
    }
}

/// Read cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether documents read from disk are cached.
    pub enabled: bool,
    /// Maximum number of cached documents before LRU eviction.
    pub max_size: usize,
    /// Time-to-live of an entry; `Duration::ZERO` disables expiry.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    /// A disabled cache.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_size: 0,
            ttl: Duration::ZERO,
        }
    }

    /// Sets whether the cache is enabled.
    #[must_use]
    pub const fn enabled(mut self, value: bool) -> Self {
        self.enabled = value;
        self
    }

    /// Sets the maximum entry count.
    #[must_use]
    pub const fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Sets the entry time-to-live.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Compression, batching and admission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceConfig {
    /// Whether new writes are LZ4-compressed.
    pub enable_compression: bool,
    /// Number of writes grouped under one admission and directory sync.
    pub batch_size: usize,
    /// Upper bound on file operations running at once.
    pub max_concurrent_operations: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_compression: false,
            batch_size: 50,
            max_concurrent_operations: 10,
        }
    }
}

impl PerformanceConfig {
    /// Sets whether writes are compressed.
    #[must_use]
    pub const fn enable_compression(mut self, value: bool) -> Self {
        self.enable_compression = value;
        self
    }

    /// Sets the write batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the admission bound.
    #[must_use]
    pub const fn max_concurrent_operations(mut self, max: usize) -> Self {
        self.max_concurrent_operations = max;
        self
    }
}

/// Encryption at rest.
///
/// The key lives only in memory and is zeroized when the config is dropped.
#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    /// Whether documents are sealed before they reach disk.
    pub enabled: bool,
    /// The document key. Required when `enabled` is set.
    pub key: Option<EncryptionKey>,
}

impl EncryptionConfig {
    /// Encryption enabled with `key`.
    #[must_use]
    pub fn with_key(key: EncryptionKey) -> Self {
        Self {
            enabled: true,
            key: Some(key),
        }
    }

    /// The key to seal with, if encryption is on.
    #[must_use]
    pub fn active_key(&self) -> Option<&EncryptionKey> {
        if self.enabled {
            self.key.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert!(!config.performance.enable_compression);
        assert_eq!(config.performance.batch_size, 50);
        assert_eq!(config.performance.max_concurrent_operations, 10);
        assert!(!config.encryption.enabled);
        assert!(config.assets_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new("/tmp/store")
            .assets_dir("/tmp/assets")
            .compression(true)
            .cache(CacheConfig::default().max_size(10).ttl(Duration::from_secs(1)))
            .performance(
                PerformanceConfig::default()
                    .enable_compression(true)
                    .batch_size(5)
                    .max_concurrent_operations(2),
            );

        assert_eq!(config.data_dir(), Path::new("/tmp/store"));
        assert_eq!(config.assets_dir.as_deref(), Some(Path::new("/tmp/assets")));
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.performance.batch_size, 5);
        assert_eq!(config.performance.max_concurrent_operations, 2);
        assert!(config.performance.enable_compression);
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let zero_ops = Config::new("d")
            .performance(PerformanceConfig::default().max_concurrent_operations(0));
        assert!(matches!(
            zero_ops.validate(),
            Err(CoreError::InvalidConfig { .. })
        ));

        let zero_batch = Config::new("d").performance(PerformanceConfig::default().batch_size(0));
        assert!(zero_batch.validate().is_err());

        let zero_cache = Config::new("d").cache(CacheConfig::default().max_size(0));
        assert!(zero_cache.validate().is_err());

        // A disabled cache may have any size.
        let disabled = Config::new("d").cache(CacheConfig::disabled());
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn validate_requires_key_when_encrypted() {
        let mut config = Config::new("d");
        config.encryption.enabled = true;
        assert!(config.validate().is_err());

        let config = Config::new("d").encryption_key(EncryptionKey::generate());
        assert!(config.validate().is_ok());
        assert!(config.encryption.active_key().is_some());
    }

    #[test]
    fn disabled_encryption_has_no_active_key() {
        let mut config = Config::new("d").encryption_key(EncryptionKey::generate());
        config.encryption.enabled = false;
        assert!(config.encryption.active_key().is_none());
    }

    #[test]
    fn assets_must_differ_from_data() {
        let config = Config::new("/srv/data").assets_dir("/srv/data");
        assert!(config.validate().is_err());
    }
}
