//! # DocVault Core
//!
//! A file-backed JSON document store for single-node applications.
//!
//! Documents are grouped into collections; each document is one file at
//! `<data_dir>/<collection>/<id>.json`. The crate provides:
//!
//! - [`StorageEngine`] - create, read, update, delete and query documents
//! - [`CacheManager`] - TTL + LRU cache of decoded documents
//! - [`ConcurrencyController`] - FIFO admission bounding file operations
//! - [`integrity::validate`] - offline id/decode checks with optional repair
//! - [`BackupManager`] - directory backups and staged restores
//! - [`DocumentAdapter`] - the trait hosts code against
//!
//! ## Example
//!
//! ```rust,no_run
//! use docvault_core::{Config, Document, Query, StorageEngine};
//!
//! let engine = StorageEngine::connect(Config::new("./data"))?;
//! engine.create("posts", Document::new("p1").with("title", "Hello"))?;
//!
//! let post = engine.find_by_id("posts", "p1")?;
//! assert_eq!(post.get("title").and_then(|v| v.as_str()), Some("Hello"));
//!
//! let hits = engine.find("posts", &Query::new().exists("title"))?;
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), docvault_core::CoreError>(())
//! ```
//!
//! ## Durability
//!
//! Writes go to a temp file, are synced, renamed over the target, and the
//! directory is synced. After a crash a document is either its old or its
//! new version; leftover temp files are ignored by every read path.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
pub mod backup;
mod cache;
mod config;
mod dir;
mod engine;
mod error;
mod format;
pub mod integrity;
mod query;
mod scheduler;
mod stats;

pub use adapter::DocumentAdapter;
pub use backup::{BackupManager, BackupManifest, RestoreReport};
pub use cache::{CacheManager, CacheStats, Clock, ManualClock, ReadTicket, SystemClock};
pub use config::{CacheConfig, Config, EncryptionConfig, PerformanceConfig};
pub use dir::{
    id_from_file_name, sanitize_collection, validate_id, DataDir, DocumentFile,
    CACHE_ARTIFACT_DIR, DOCUMENT_EXT,
};
pub use engine::{StorageEngine, WriteOp};
pub use error::{CoreError, CoreResult};
pub use format::DocumentFormat;
pub use integrity::{IssueKind, ValidationIssue, ValidationReport};
pub use query::{Condition, Predicate, Query, SortOrder};
pub use scheduler::{ConcurrencyController, Permit};
pub use stats::{format_millis, CollectionStats, OperationSnapshot, OperationStats, StatsSnapshot};

// Re-exported so hosts need only this crate.
pub use docvault_codec::Document;
pub use docvault_storage::EncryptionKey;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
