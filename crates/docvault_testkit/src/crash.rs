//! Crash simulation for document writes.
//!
//! A write is: stage bytes in a temp file, fsync, rename over the target,
//! fsync the directory. These helpers stop that sequence at a chosen
//! point and leave the disk exactly as a crash there would.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docvault_testkit::crash::{simulate_crash, CrashPoint};
//!
//! let outcome = simulate_crash(&store, "posts", &new_version, CrashPoint::BeforeRename);
//! assert!(outcome.temp_file.unwrap().exists());
//! ```

use docvault_core::{Document, StorageEngine};
use docvault_storage::StagedWrite;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Points at which a write can be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Temp file created but only half its bytes written.
    DuringTempWrite,
    /// Temp file complete and synced; rename never happened.
    BeforeRename,
    /// Rename done; directory not yet synced. On a running system the new
    /// version is visible.
    AfterRename,
}

/// What a simulated crash left behind.
#[derive(Debug, Clone)]
pub struct CrashOutcome {
    /// Where it crashed.
    pub point: CrashPoint,
    /// Path of the document file.
    pub target: PathBuf,
    /// Temp file left on disk, if any.
    pub temp_file: Option<PathBuf>,
}

/// Writes `document` into `collection` the way the engine would, stopping
/// at `point`.
///
/// The engine's cache is not touched; call `clear_cache` before reading
/// back if the document was cached.
pub fn simulate_crash(
    engine: &StorageEngine,
    collection: &str,
    document: &Document,
    point: CrashPoint,
) -> CrashOutcome {
    let dir = engine.data_dir().join(collection);
    std::fs::create_dir_all(&dir).expect("Failed to create collection directory");
    let target = dir.join(format!("{}.json", document.id()));
    let bytes = engine
        .format()
        .encode(document)
        .expect("Failed to encode document");

    let temp_file = match point {
        CrashPoint::DuringTempWrite => {
            let temp = docvault_storage::temp_path_for(&target);
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp)
                .expect("Failed to create temp file");
            file.write_all(&bytes[..bytes.len() / 2])
                .expect("Failed to write partial temp file");
            Some(temp)
        }
        CrashPoint::BeforeRename => Some(
            StagedWrite::prepare(&target, &bytes)
                .expect("Failed to stage write")
                .abandon(),
        ),
        CrashPoint::AfterRename => {
            StagedWrite::prepare(&target, &bytes)
                .expect("Failed to stage write")
                .commit()
                .expect("Failed to commit staged write");
            None
        }
    };

    CrashOutcome {
        point,
        target,
        temp_file,
    }
}

/// Checks what a reader sees after a crash at `point` over a document
/// whose committed version was `before`.
///
/// Returns an error message if the store shows anything other than a whole
/// old or whole new version.
pub fn verify_after_crash(
    engine: &StorageEngine,
    collection: &str,
    before: &Document,
    after: &Document,
    point: CrashPoint,
) -> Result<(), String> {
    engine.clear_cache();
    let seen = engine
        .find_by_id(collection, before.id())
        .map_err(|e| format!("read after crash failed: {e}"))?;

    let expected = match point {
        CrashPoint::DuringTempWrite | CrashPoint::BeforeRename => before,
        CrashPoint::AfterRename => after,
    };
    if &seen != expected {
        return Err(format!(
            "after crash at {point:?} expected {expected:?}, found {seen:?}"
        ));
    }

    let count = engine
        .count(collection)
        .map_err(|e| format!("count after crash failed: {e}"))?;
    let listed = engine
        .find(collection, &docvault_core::Query::all())
        .map_err(|e| format!("scan after crash failed: {e}"))?;
    if listed.len() != count {
        return Err(format!(
            "scan returned {} documents but {count} files are listed",
            listed.len()
        ));
    }
    Ok(())
}
