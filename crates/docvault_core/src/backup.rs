//! Directory-level backup and restore.
//!
//! A backup set is a plain directory:
//!
//! ```text
//! <backup>/
//! ├─ BACKUP.json   # manifest, written last
//! ├─ data/         # copy of the data directory
//! └─ assets/       # copy of the assets directory, if configured
//! ```
//!
//! Hidden entries (the cache artifact directory, temp files from
//! interrupted writes) are never copied. The manifest is written last, so
//! a directory without one is an incomplete backup.
//!
//! ## Usage
//!
//! ```ignore
//! use docvault_core::backup::BackupManager;
//!
//! let manager = BackupManager::new("./data", None);
//! let (path, manifest) = manager.create_timestamped("./backups")?;
//!
//! // Later, with no engine running:
//! manager.restore(&path, true)?;
//! ```

use crate::config::Config;
use crate::dir::DataDir;
use crate::error::{CoreError, CoreResult};
use docvault_storage::{copy_dir_all, is_temp_file, sync_dir, write_atomic, CopyStats};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// File name of the manifest inside a backup set.
pub const MANIFEST_FILE: &str = "BACKUP.json";
/// Subdirectory holding the copied data directory.
pub const DATA_SUBDIR: &str = "data";
/// Subdirectory holding the copied assets directory.
pub const ASSETS_SUBDIR: &str = "assets";
/// Current manifest format version.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Metadata written alongside a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Manifest format version.
    pub format_version: u32,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Data directory the backup was taken from.
    pub source: String,
    /// Collections copied.
    pub collections: u64,
    /// Document files copied.
    pub documents: u64,
    /// Bytes of document files copied.
    pub bytes: u64,
    /// Whether an `assets/` copy is part of the set.
    pub includes_assets: bool,
    /// Asset files copied.
    #[serde(default)]
    pub asset_files: u64,
    /// Bytes of asset files copied.
    #[serde(default)]
    pub asset_bytes: u64,
}

/// Result of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Document files restored.
    pub documents: u64,
    /// Bytes restored into the data directory.
    pub bytes: u64,
    /// Whether the assets directory was replaced.
    pub assets_restored: bool,
    /// When the restored backup was taken.
    pub backup_created_at_ms: u64,
}

/// Creates and restores backup sets for one data directory.
///
/// Restore replaces directories wholesale and must not run while an
/// engine has the data directory open.
#[derive(Debug, Clone)]
pub struct BackupManager {
    data_dir: PathBuf,
    assets_dir: Option<PathBuf>,
}

fn skip_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Absolute form of `path` with symlinks resolved as far as it exists.
fn resolve_path(path: &Path) -> CoreResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Ok(absolute);
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

impl BackupManager {
    /// Creates a manager for `data_dir` and an optional assets directory.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, assets_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            assets_dir,
        }
    }

    /// Creates a manager for the directories named in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_dir.clone(), config.assets_dir.clone())
    }

    /// Copies the data (and assets) directory into `destination`.
    ///
    /// `destination` must not exist or must be empty. If this fails part
    /// way, the destination is left incomplete (no manifest) and should be
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBackup`] if the destination is not
    /// empty, or an I/O error from copying.
    pub fn create_backup(&self, destination: &Path) -> CoreResult<BackupManifest> {
        self.check_outside_sources(destination)?;
        if destination.exists() && !destination.is_dir() {
            return Err(CoreError::invalid_backup(
                destination,
                "destination is not a directory",
            ));
        }
        if !DataDir::at(destination).is_empty()? {
            return Err(CoreError::invalid_backup(
                destination,
                "destination already exists and is not empty",
            ));
        }

        let data_target = destination.join(DATA_SUBDIR);
        let data = if self.data_dir.is_dir() {
            copy_dir_all(&self.data_dir, &data_target, &skip_hidden)?
        } else {
            fs::create_dir_all(&data_target)?;
            CopyStats::default()
        };
        let collections = DataDir::at(&data_target).list_collections()?.len() as u64;

        let assets = match &self.assets_dir {
            Some(assets_dir) if assets_dir.is_dir() => Some(copy_dir_all(
                assets_dir,
                &destination.join(ASSETS_SUBDIR),
                &is_temp_file,
            )?),
            _ => None,
        };

        let manifest = BackupManifest {
            format_version: BACKUP_FORMAT_VERSION,
            created_at_ms: now_millis(),
            source: self.data_dir.display().to_string(),
            collections,
            documents: data.files,
            bytes: data.bytes,
            includes_assets: assets.is_some(),
            asset_files: assets.map_or(0, |a| a.files),
            asset_bytes: assets.map_or(0, |a| a.bytes),
        };
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| CoreError::invalid_backup(destination, e.to_string()))?;
        write_atomic(&destination.join(MANIFEST_FILE), &body)?;

        info!(
            destination = %destination.display(),
            documents = manifest.documents,
            bytes = manifest.bytes,
            assets = manifest.includes_assets,
            "backup created"
        );
        Ok(manifest)
    }

    /// A destination inside a directory being copied would be copied into
    /// itself.
    fn check_outside_sources(&self, destination: &Path) -> CoreResult<()> {
        let target = resolve_path(destination)?;
        let sources = std::iter::once(&self.data_dir).chain(self.assets_dir.as_ref());
        for source in sources {
            if target.starts_with(resolve_path(source)?) {
                return Err(CoreError::invalid_backup(
                    destination,
                    format!("destination is inside {}", source.display()),
                ));
            }
        }
        Ok(())
    }

    /// Creates a backup in a new `backup-YYYYMMDD-HHMMSS` directory under
    /// `parent`.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::create_backup`].
    pub fn create_timestamped(&self, parent: &Path) -> CoreResult<(PathBuf, BackupManifest)> {
        self.check_outside_sources(parent)?;
        fs::create_dir_all(parent)?;
        let stamp = chrono::Local::now().format("backup-%Y%m%d-%H%M%S").to_string();

        let mut destination = parent.join(&stamp);
        let mut attempt = 1;
        while destination.exists() {
            attempt += 1;
            destination = parent.join(format!("{stamp}-{attempt}"));
        }

        let manifest = self.create_backup(&destination)?;
        Ok((destination, manifest))
    }

    /// Reads and checks the manifest of a backup set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBackup`] if the manifest is missing,
    /// unparseable, from a newer format, or the data copy is missing.
    pub fn read_manifest(source: &Path) -> CoreResult<BackupManifest> {
        let manifest_path = source.join(MANIFEST_FILE);
        let body = match fs::read(&manifest_path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::invalid_backup(
                    source,
                    format!("{MANIFEST_FILE} not found"),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let manifest: BackupManifest = serde_json::from_slice(&body).map_err(|e| {
            CoreError::invalid_backup(source, format!("unreadable {MANIFEST_FILE}: {e}"))
        })?;

        if manifest.format_version == 0 || manifest.format_version > BACKUP_FORMAT_VERSION {
            return Err(CoreError::invalid_backup(
                source,
                format!("unsupported backup format {}", manifest.format_version),
            ));
        }
        if !source.join(DATA_SUBDIR).is_dir() {
            return Err(CoreError::invalid_backup(
                source,
                format!("{DATA_SUBDIR}/ directory is missing"),
            ));
        }
        if manifest.includes_assets && !source.join(ASSETS_SUBDIR).is_dir() {
            return Err(CoreError::invalid_backup(
                source,
                format!("{ASSETS_SUBDIR}/ directory is missing"),
            ));
        }
        Ok(manifest)
    }

    /// Replaces the live data (and assets) directory with a backup's.
    ///
    /// Without `force`, refuses when the live directory holds anything.
    /// The backup is first copied next to the live directory and then
    /// swapped in by rename, so a failed copy leaves live data untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfirmationRequired`] without `force` on a
    /// non-empty store, [`CoreError::InvalidBackup`] for a bad backup set,
    /// or an I/O error.
    pub fn restore(&self, source: &Path, force: bool) -> CoreResult<RestoreReport> {
        let manifest = Self::read_manifest(source)?;
        let restore_assets = manifest.includes_assets && self.assets_dir.is_some();

        if !force {
            if !DataDir::at(&self.data_dir).is_empty()? {
                return Err(CoreError::ConfirmationRequired {
                    path: self.data_dir.clone(),
                });
            }
            if let Some(assets_dir) = self.assets_dir.as_ref().filter(|_| restore_assets) {
                if !DataDir::at(assets_dir).is_empty()? {
                    return Err(CoreError::ConfirmationRequired {
                        path: assets_dir.clone(),
                    });
                }
            }
        }

        let data = swap_in(&source.join(DATA_SUBDIR), &self.data_dir)?;

        let mut assets_restored = false;
        if let Some(assets_dir) = &self.assets_dir {
            if manifest.includes_assets {
                swap_in(&source.join(ASSETS_SUBDIR), assets_dir)?;
                assets_restored = true;
            }
        } else if manifest.includes_assets {
            warn!(
                source = %source.display(),
                "backup contains assets but no assets directory is configured; skipped"
            );
        }

        info!(
            source = %source.display(),
            data_dir = %self.data_dir.display(),
            documents = data.files,
            assets = assets_restored,
            "backup restored"
        );
        Ok(RestoreReport {
            documents: data.files,
            bytes: data.bytes,
            assets_restored,
            backup_created_at_ms: manifest.created_at_ms,
        })
    }
}

/// Copies `src` to a staging sibling of `live`, then renames it into
/// place. The previous `live` is kept aside until the swap succeeds.
fn swap_in(src: &Path, live: &Path) -> CoreResult<CopyStats> {
    let parent = live
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CoreError::invalid_config(format!("{} has no file name", live.display())))?;
    fs::create_dir_all(parent)?;

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let staging = parent.join(format!(".{name}.restore-{suffix}"));
    let previous = parent.join(format!(".{name}.old-{suffix}"));

    let stats = match copy_dir_all(src, &staging, &is_temp_file) {
        Ok(stats) => stats,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
    };

    let had_live = live.exists();
    if had_live {
        if let Err(e) = fs::rename(live, &previous) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
    }
    if let Err(e) = fs::rename(&staging, live) {
        if had_live {
            let _ = fs::rename(&previous, live);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }
    sync_dir(parent)?;

    if had_live {
        if let Err(e) = fs::remove_dir_all(&previous) {
            warn!(path = %previous.display(), error = %e, "could not remove replaced directory");
        }
    }
    Ok(stats)
}
