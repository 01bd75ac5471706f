//! File primitives for crash-safe document writes.
//!
//! Every write goes to a temporary sibling first and is renamed over the
//! target only once its bytes are synced:
//!
//! ```text
//! <dir>/.<name>.<uuid>.tmp   -- write + fsync
//! rename -> <dir>/<name>     -- atomic on POSIX and NTFS
//! fsync <dir>                -- make the rename durable
//! ```
//!
//! A crash before the rename leaves only a temp file behind. Readers never
//! see a partially written target.

use crate::error::StorageResult;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Suffix of in-flight temporary files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Returns true if `file_name` is a temporary file left by a staged write.
#[must_use]
pub fn is_temp_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(TEMP_SUFFIX)
}

/// Returns a fresh temporary path next to `target`.
#[must_use]
pub fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(".{name}.{}{TEMP_SUFFIX}", uuid::Uuid::new_v4().simple());
    target.with_file_name(temp_name)
}

/// A write that has reached disk under a temporary name but is not yet
/// visible under its real name.
///
/// Dropping an uncommitted `StagedWrite` removes the temporary file.
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    temp: PathBuf,
    armed: bool,
}

impl StagedWrite {
    /// Writes `data` to a synced temporary file beside `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be written or synced.
    pub fn prepare(target: &Path, data: &[u8]) -> StorageResult<Self> {
        let temp = temp_path_for(target);
        let mut staged = Self {
            target: target.to_path_buf(),
            temp,
            armed: true,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged.temp)?;
        if let Err(e) = file.write_all(data).and_then(|()| file.sync_all()) {
            drop(file);
            staged.discard();
            return Err(e.into());
        }

        trace!(temp = %staged.temp.display(), bytes = data.len(), "staged write");
        Ok(staged)
    }

    /// Returns the temporary path holding the staged bytes.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Returns the final path.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged file over the target.
    ///
    /// The parent directory is not synced; call [`sync_dir`] once per
    /// batch of commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the temp file is removed.
    pub fn commit(mut self) -> StorageResult<()> {
        match fs::rename(&self.temp, &self.target) {
            Ok(()) => {
                self.armed = false;
                Ok(())
            }
            Err(e) => {
                self.discard();
                Err(e.into())
            }
        }
    }

    /// Publishes the staged file under the target name only if the target
    /// does not exist yet.
    ///
    /// Returns `Ok(false)` (and removes the temp file) if the target already
    /// exists. The check and the publish are a single hard-link call, so two
    /// racing writers cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if linking fails for any other reason.
    pub fn commit_new(mut self) -> StorageResult<bool> {
        let result = fs::hard_link(&self.temp, &self.target);
        self.discard();
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Leaves the temporary file on disk without committing, as a crash
    /// between write and rename would.
    pub fn abandon(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.temp)
    }

    fn discard(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.temp);
            self.armed = false;
        }
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Writes `data` to `path` atomically and syncs the parent directory.
///
/// # Errors
///
/// Returns an error if any step fails; the target is left untouched.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    StagedWrite::prepare(path, data)?.commit()?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Reads a whole file, returning `None` if it does not exist.
///
/// # Errors
///
/// Returns an error for any I/O failure other than "not found".
pub fn read_file(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file, returning `false` if it did not exist.
///
/// # Errors
///
/// Returns an error for any I/O failure other than "not found".
pub fn remove_file(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Syncs a directory so that entry creations, renames and removals in it
/// are durable.
///
/// On Windows, NTFS journaling covers metadata durability and directories
/// cannot be opened for sync, so this is a no-op there.
#[cfg(unix)]
pub fn sync_dir(path: &Path) -> StorageResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Syncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub fn sync_dir(_path: &Path) -> StorageResult<()> {
    Ok(())
}

/// Counters returned by [`copy_dir_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Number of files copied.
    pub files: u64,
    /// Number of bytes copied.
    pub bytes: u64,
}

/// Recursively copies `src` into `dst`, creating `dst` as needed.
///
/// Entries for which `skip` returns true (given the entry's file name) are
/// not copied, and skipped directories are not descended into. Symlinks
/// are not followed.
///
/// # Errors
///
/// Returns the first I/O error; `dst` is then in an indeterminate state.
pub fn copy_dir_all(
    src: &Path,
    dst: &Path,
    skip: &dyn Fn(&str) -> bool,
) -> StorageResult<CopyStats> {
    let mut stats = CopyStats::default();
    copy_dir_inner(src, dst, skip, &mut stats)?;
    Ok(stats)
}

fn copy_dir_inner(
    src: &Path,
    dst: &Path,
    skip: &dyn Fn(&str) -> bool,
    stats: &mut CopyStats,
) -> StorageResult<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if skip(&name_str) {
            continue;
        }

        let file_type = entry.file_type()?;
        let target = dst.join(&name);
        if file_type.is_dir() {
            copy_dir_inner(&entry.path(), &target, skip, stats)?;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }
    Ok(())
}
