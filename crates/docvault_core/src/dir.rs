//! On-disk layout of a data directory.
//!
//! ```text
//! <data_dir>/
//! ├─ <collection>/
//! │  ├─ <id>.json             # one document
//! │  └─ .<id>.json.<n>.tmp    # in-flight write, never a document
//! └─ .cache/                  # artifact dir, never authoritative
//! ```
//!
//! Anything whose name starts with `.` is ignored by listings.

use crate::error::{CoreError, CoreResult};
use docvault_storage::is_temp_file;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Extension of document files.
pub const DOCUMENT_EXT: &str = ".json";

/// Name of the optional cache artifact directory inside the data root.
pub const CACHE_ARTIFACT_DIR: &str = ".cache";

const MAX_NAME_LEN: usize = 128;
const MAX_ID_LEN: usize = 200;

/// Maps a caller-supplied collection name to a safe directory name.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`, so `"user posts"` and
/// `"user_posts"` name the same collection.
///
/// # Errors
///
/// Returns [`CoreError::InvalidName`] for empty or overlong names.
pub fn sanitize_collection(name: &str) -> CoreResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_name(name, "name is empty"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(CoreError::invalid_name(
            name,
            format!("name exceeds {MAX_NAME_LEN} bytes"),
        ));
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect())
}

/// Checks that a document id can be used verbatim as a file stem.
///
/// # Errors
///
/// Returns [`CoreError::InvalidId`] if the id is empty, too long, starts
/// with `.`, or contains characters outside `[A-Za-z0-9_.-]`.
pub fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_id(id, "id is empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::invalid_id(
            id,
            format!("id exceeds {MAX_ID_LEN} bytes"),
        ));
    }
    if id.starts_with('.') {
        return Err(CoreError::invalid_id(id, "id must not start with '.'"));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(CoreError::invalid_id(
            id,
            format!("character {bad:?} is not allowed"),
        ));
    }
    Ok(())
}

/// Returns the document id stored in `file_name`, if it names a document.
#[must_use]
pub fn id_from_file_name(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') || is_temp_file(file_name) {
        return None;
    }
    file_name
        .strip_suffix(DOCUMENT_EXT)
        .filter(|stem| !stem.is_empty())
}

/// A document file found by a directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// Id taken from the file stem.
    pub id: String,
    /// Full path of the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

/// A data directory.
///
/// This is a path wrapper; it holds no handles and may be constructed for
/// directories that a live engine also uses.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Wraps an existing data directory without touching the disk.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens a data directory, creating it if needed and probing that it
    /// is writable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InitializationError`] if the path is not a
    /// directory, cannot be created, or cannot be written.
    pub fn open(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(CoreError::initialization(&root, "path is not a directory"));
        }
        fs::create_dir_all(&root)
            .map_err(|e| CoreError::initialization(&root, format!("cannot create: {e}")))?;

        let probe = root.join(format!(".docvault-probe-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&probe, b"probe")
            .map_err(|e| CoreError::initialization(&root, format!("not writable: {e}")))?;
        fs::remove_file(&probe)
            .map_err(|e| CoreError::initialization(&root, format!("cannot remove probe: {e}")))?;

        Ok(Self { root })
    }

    /// Returns the root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a sanitized collection.
    #[must_use]
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// File of a document in a sanitized collection.
    #[must_use]
    pub fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}{DOCUMENT_EXT}"))
    }

    /// Path of the cache artifact directory.
    #[must_use]
    pub fn cache_artifact_path(&self) -> PathBuf {
        self.root.join(CACHE_ARTIFACT_DIR)
    }

    /// Returns true if the root holds no visible entries.
    ///
    /// A missing root counts as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub fn is_empty(&self) -> CoreResult<bool> {
        match fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if !entry.file_name().to_string_lossy().starts_with('.') {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists collection directory names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub fn list_collections(&self) -> CoreResult<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Lists the documents of a sanitized collection, sorted by id.
    ///
    /// A missing collection has no documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn list_documents(&self, collection: &str) -> CoreResult<Vec<DocumentFile>> {
        let mut files = Vec::new();
        let entries = match fs::read_dir(self.collection_path(collection)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = id_from_file_name(&name) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Removed between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(DocumentFile {
                id: id.to_string(),
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    /// Lists leftover temporary files in a sanitized collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn stale_temp_files(&self, collection: &str) -> CoreResult<Vec<PathBuf>> {
        let mut temps = Vec::new();
        let entries = match fs::read_dir(self.collection_path(collection)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(temps),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if is_temp_file(&entry.file_name().to_string_lossy()) {
                temps.push(entry.path());
            }
        }
        temps.sort();
        Ok(temps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_collection("posts").unwrap(), "posts");
        assert_eq!(sanitize_collection("user posts").unwrap(), "user_posts");
        assert_eq!(sanitize_collection("../etc").unwrap(), "___etc");
        assert_eq!(sanitize_collection("a/b\\c").unwrap(), "a_b_c");
        assert_eq!(sanitize_collection("  padded ").unwrap(), "padded");
    }

    #[test]
    fn sanitize_rejects_empty() {
        assert!(matches!(
            sanitize_collection(""),
            Err(CoreError::InvalidName { .. })
        ));
        assert!(sanitize_collection("   ").is_err());
        assert!(sanitize_collection(&"x".repeat(129)).is_err());
    }

    #[test]
    fn id_validation() {
        assert!(validate_id("p1").is_ok());
        assert!(validate_id("user-42_v2.1").is_ok());
        assert!(matches!(validate_id(""), Err(CoreError::InvalidId { .. })));
        assert!(validate_id(".hidden").is_err());
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("with space").is_err());
        assert!(validate_id(&"a".repeat(201)).is_err());
    }

    #[test]
    fn file_names_to_ids() {
        assert_eq!(id_from_file_name("p1.json"), Some("p1"));
        assert_eq!(id_from_file_name("v1.2.json"), Some("v1.2"));
        assert_eq!(id_from_file_name(".p1.json.abc.tmp"), None);
        assert_eq!(id_from_file_name("notes.txt"), None);
        assert_eq!(id_from_file_name(".json"), None);
    }

    #[test]
    fn open_creates_missing_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("nested/data");
        let dir = DataDir::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(dir.is_empty().unwrap());
    }

    #[test]
    fn open_rejects_file_root() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DataDir::open(&file),
            Err(CoreError::InitializationError { .. })
        ));
    }

    #[test]
    fn listings_skip_hidden_and_temp_entries() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();
        fs::create_dir_all(dir.collection_path("posts")).unwrap();
        fs::create_dir_all(dir.collection_path("users")).unwrap();
        fs::create_dir_all(dir.cache_artifact_path()).unwrap();
        fs::write(dir.document_path("posts", "p2"), b"{}").unwrap();
        fs::write(dir.document_path("posts", "p1"), b"{}").unwrap();
        fs::write(dir.collection_path("posts").join(".p3.json.ab.tmp"), b"{").unwrap();
        fs::write(dir.collection_path("posts").join("README"), b"x").unwrap();

        assert_eq!(dir.list_collections().unwrap(), vec!["posts", "users"]);

        let ids: Vec<_> = dir
            .list_documents("posts")
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(dir.stale_temp_files("posts").unwrap().len(), 1);
        assert!(dir.list_documents("missing").unwrap().is_empty());
        assert!(!dir.is_empty().unwrap());
    }
}
