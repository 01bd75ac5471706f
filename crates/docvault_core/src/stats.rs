//! Store statistics.
//!
//! Two kinds of numbers live here:
//!
//! - [`OperationStats`]: atomic counters bumped by the engine as it works,
//!   readable while operations are in progress.
//! - [`StatsSnapshot`]: a point-in-time report built by walking the data
//!   directory. Document and byte counts come only from the walk, so they
//!   are correct even when other processes write to the same directory.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = engine.stats()?;
//! println!("{stats}");
//! println!("{}", serde_json::to_string_pretty(&stats)?);
//! ```

use crate::cache::CacheStats;
use crate::dir::DataDir;
use crate::error::CoreResult;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Engine operation counters.
///
/// Values only grow.
#[derive(Debug, Default)]
pub struct OperationStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    batches: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    errors: AtomicU64,
}

impl OperationStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a document file read.
    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a committed document write.
    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a delete.
    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a collection scan.
    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one admitted write batch chunk.
    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed operation.
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Document file reads.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Committed document writes.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Deletes.
    #[must_use]
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Collection scans.
    #[must_use]
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Failed operations.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            scans: self.scans(),
            batches: self.batches.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            errors: self.errors(),
        }
    }
}

/// Point-in-time copy of [`OperationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    /// Document file reads.
    pub reads: u64,
    /// Committed document writes.
    pub writes: u64,
    /// Deletes.
    pub deletes: u64,
    /// Collection scans.
    pub scans: u64,
    /// Write batch chunks admitted.
    pub batches: u64,
    /// Bytes read from document files.
    pub bytes_read: u64,
    /// Bytes written to document files.
    pub bytes_written: u64,
    /// Failed operations.
    pub errors: u64,
}

/// Counts for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Collection directory name.
    pub name: String,
    /// Number of document files.
    pub documents: u64,
    /// Sum of document file sizes.
    pub bytes: u64,
    /// Newest document modification, in ms since the Unix epoch.
    pub last_modified_ms: Option<u64>,
}

/// Walk-based report of a data directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Data directory that was walked.
    pub data_dir: String,
    /// Per-collection counts, sorted by name.
    pub collections: Vec<CollectionStats>,
    /// Total document files.
    pub total_documents: u64,
    /// Total bytes of document files.
    pub total_bytes: u64,
    /// Newest document modification across all collections.
    pub last_modified_ms: Option<u64>,
    /// Cache counters.
    pub cache: CacheStats,
    /// Engine counters.
    pub operations: OperationSnapshot,
}

impl StatsSnapshot {
    /// Walks `dir` and combines the counts with the given counters.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn collect(
        dir: &DataDir,
        cache: CacheStats,
        operations: OperationSnapshot,
    ) -> CoreResult<Self> {
        let mut collections = Vec::new();
        for name in dir.list_collections()? {
            let files = dir.list_documents(&name)?;
            let last_modified_ms = files
                .iter()
                .filter_map(|f| f.modified.and_then(millis_since_epoch))
                .max();
            collections.push(CollectionStats {
                documents: files.len() as u64,
                bytes: files.iter().map(|f| f.size).sum(),
                last_modified_ms,
                name,
            });
        }

        Ok(Self {
            data_dir: dir.root().display().to_string(),
            total_documents: collections.iter().map(|c| c.documents).sum(),
            total_bytes: collections.iter().map(|c| c.bytes).sum(),
            last_modified_ms: collections.iter().filter_map(|c| c.last_modified_ms).max(),
            collections,
            cache,
            operations,
        })
    }

    /// Number of collections.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Counts for one collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.collections.iter().find(|c| c.name == name)
    }
}

fn millis_since_epoch(time: SystemTime) -> Option<u64> {
    let millis = time.duration_since(UNIX_EPOCH).ok()?.as_millis();
    u64::try_from(millis).ok()
}

/// Formats ms since the epoch as a UTC timestamp.
#[must_use]
pub fn format_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || millis.to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data directory: {}", self.data_dir)?;
        writeln!(f, "Collections:    {}", self.collections.len())?;
        writeln!(f, "Documents:      {}", self.total_documents)?;
        writeln!(f, "Size:           {} bytes", self.total_bytes)?;
        if let Some(ms) = self.last_modified_ms {
            writeln!(f, "Last modified:  {}", format_millis(ms))?;
        }

        if !self.collections.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<24} {:>10} {:>12}", "COLLECTION", "DOCUMENTS", "BYTES")?;
            for c in &self.collections {
                writeln!(f, "{:<24} {:>10} {:>12}", c.name, c.documents, c.bytes)?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "Cache: {} ({} / {} entries, {} hits, {} misses, {:.1}% hit rate)",
            if self.cache.enabled { "enabled" } else { "disabled" },
            self.cache.entries,
            self.cache.max_size,
            self.cache.hits,
            self.cache.misses,
            self.cache.hit_rate() * 100.0
        )?;
        write!(
            f,
            "Operations: {} reads, {} writes, {} deletes, {} scans, {} errors",
            self.operations.reads,
            self.operations.writes,
            self.operations.deletes,
            self.operations.scans,
            self.operations.errors
        )
    }
}
