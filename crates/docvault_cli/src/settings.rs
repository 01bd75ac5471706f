//! Resolves a store [`Config`] from a JSON config file and command-line
//! overrides.
//!
//! ```json
//! {
//!   "data_dir": "./data",
//!   "assets_dir": "./uploads",
//!   "cache": { "enabled": true, "max_size": 1000, "ttl_secs": 300 },
//!   "performance": { "enable_compression": false, "batch_size": 50,
//!                    "max_concurrent_operations": 10 },
//!   "encryption": { "enabled": true, "key": "<64 hex chars>" }
//! }
//! ```
//!
//! Every field is optional. Precedence: command line, then file, then
//! built-in defaults.

use docvault_core::{CacheConfig, Config, EncryptionKey, PerformanceConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<PathBuf>,
    /// Assets directory.
    pub assets_dir: Option<PathBuf>,
    /// Cache section.
    pub cache: CacheSection,
    /// Performance section.
    pub performance: PerformanceSection,
    /// Encryption section.
    pub encryption: EncryptionSection,
}

/// `cache` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Whether reads are cached.
    pub enabled: Option<bool>,
    /// Maximum cached documents.
    pub max_size: Option<usize>,
    /// Entry time-to-live in seconds.
    pub ttl_secs: Option<u64>,
}

/// `performance` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceSection {
    /// Whether writes are compressed.
    pub enable_compression: Option<bool>,
    /// Writes per batch chunk.
    pub batch_size: Option<usize>,
    /// Admission bound.
    pub max_concurrent_operations: Option<usize>,
}

/// `encryption` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionSection {
    /// Whether documents are sealed.
    pub enabled: bool,
    /// Hex-encoded 32-byte key.
    pub key: Option<String>,
    /// Passphrase to derive the key from (requires `salt`).
    pub passphrase: Option<String>,
    /// Salt for passphrase derivation.
    pub salt: Option<String>,
}

impl ConfigFile {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let body = fs::read(path)
            .map_err(|e| format!("cannot read config file {}: {e}", path.display()))?;
        let file = serde_json::from_slice(&body)
            .map_err(|e| format!("invalid config file {}: {e}", path.display()))?;
        Ok(file)
    }

    fn key(&self) -> Result<Option<EncryptionKey>, Box<dyn std::error::Error>> {
        let enc = &self.encryption;
        if let Some(hex) = &enc.key {
            return Ok(Some(EncryptionKey::from_hex(hex.trim())?));
        }
        match (&enc.passphrase, &enc.salt) {
            (Some(passphrase), Some(salt)) => Ok(Some(EncryptionKey::derive_from_passphrase(
                passphrase.as_bytes(),
                salt.as_bytes(),
            )?)),
            (Some(_), None) => Err("encryption.passphrase requires encryption.salt".into()),
            _ => Ok(None),
        }
    }
}

/// Builds the store configuration.
///
/// `path` and `key_hex` come from the command line (`--path`, `--key` or
/// `DOCVAULT_KEY`) and win over the file.
pub fn resolve(
    config_path: Option<&Path>,
    path: Option<PathBuf>,
    key_hex: Option<&str>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let file = match config_path {
        Some(p) => ConfigFile::load(p)?,
        None => ConfigFile::default(),
    };

    let data_dir = path
        .or_else(|| file.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./data"));
    let mut config = Config::new(data_dir);
    if let Some(assets) = &file.assets_dir {
        config = config.assets_dir(assets.clone());
    }

    let defaults = CacheConfig::default();
    config = config.cache(
        CacheConfig::default()
            .enabled(file.cache.enabled.unwrap_or(defaults.enabled))
            .max_size(file.cache.max_size.unwrap_or(defaults.max_size))
            .ttl(
                file.cache
                    .ttl_secs
                    .map_or(defaults.ttl, Duration::from_secs),
            ),
    );

    let defaults = PerformanceConfig::default();
    let perf = &file.performance;
    config = config.performance(
        PerformanceConfig::default()
            .enable_compression(perf.enable_compression.unwrap_or(defaults.enable_compression))
            .batch_size(perf.batch_size.unwrap_or(defaults.batch_size))
            .max_concurrent_operations(
                perf.max_concurrent_operations
                    .unwrap_or(defaults.max_concurrent_operations),
            ),
    );

    let key = match key_hex {
        Some(hex) => Some(EncryptionKey::from_hex(hex.trim())?),
        None if file.encryption.enabled => file.key()?,
        None => None,
    };
    match key {
        Some(key) => config = config.encryption_key(key),
        None if file.encryption.enabled => {
            return Err("encryption is enabled but no key was given (use --key or DOCVAULT_KEY)".into());
        }
        None => {}
    }

    config.validate()?;
    Ok(config)
}
