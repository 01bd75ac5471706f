//! The storage engine: collections of JSON documents, one file each.

use crate::backup::BackupManager;
use crate::cache::{CacheManager, Clock, SystemClock};
use crate::config::Config;
use crate::dir::{sanitize_collection, validate_id, DataDir};
use crate::error::{CoreError, CoreResult};
use crate::format::DocumentFormat;
use crate::integrity::{self, ValidationReport};
use parking_lot::RwLock;
use crate::query::Query;
use crate::scheduler::ConcurrencyController;
use crate::stats::{OperationStats, StatsSnapshot};
use docvault_codec::Document;
use docvault_storage::{read_file, remove_file, sync_dir, StagedWrite};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One write submitted through [`StorageEngine::write_batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create a new document; fails with `DuplicateId` if it exists.
    Create(Document),
    /// Replace an existing document; fails with `NotFound` if absent.
    Update {
        /// Target id; overrides any `id` inside `document`.
        id: String,
        /// New contents.
        document: Document,
    },
}

impl WriteOp {
    /// A create.
    #[must_use]
    pub fn create(document: Document) -> Self {
        Self::Create(document)
    }

    /// An update of `id`.
    #[must_use]
    pub fn update(id: impl Into<String>, document: Document) -> Self {
        Self::Update {
            id: id.into(),
            document,
        }
    }

    /// The id this operation writes.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Create(document) => document.id(),
            Self::Update { id, .. } => id,
        }
    }
}

/// A file-backed document store.
///
/// Each document lives at `<data_dir>/<collection>/<id>.json`. Every write
/// goes through a temp file and an atomic rename, so readers and crashes
/// only ever see whole documents. All file operations pass through a
/// [`ConcurrencyController`]; decoded documents are kept in a
/// [`CacheManager`].
///
/// The engine is `Send + Sync`; share it behind an `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use docvault_core::{Config, Document, Query, StorageEngine};
///
/// let engine = StorageEngine::connect(Config::new("./data"))?;
/// engine.create("posts", Document::new("p1").with("title", "Hello"))?;
/// let found = engine.find("posts", &Query::new().where_eq("title", "Hello"))?;
/// assert_eq!(found.len(), 1);
/// # Ok::<(), docvault_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct StorageEngine {
    config: Config,
    dir: DataDir,
    format: DocumentFormat,
    cache: CacheManager,
    scheduler: ConcurrencyController,
    stats: OperationStats,
    /// Shared by writers, held exclusively while validation rewrites a
    /// document.
    write_gate: RwLock<()>,
}

impl StorageEngine {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a bad configuration and
    /// [`CoreError::InitializationError`] if the data directory cannot be
    /// created or written.
    pub fn connect(config: Config) -> CoreResult<Self> {
        Self::connect_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`StorageEngine::connect`], with the cache reading time from
    /// `clock`.
    ///
    /// # Errors
    ///
    /// See [`StorageEngine::connect`].
    pub fn connect_with_clock(config: Config, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        config.validate()?;
        let dir = DataDir::open(&config.data_dir)?;
        let format = DocumentFormat::from_config(&config);
        let cache = CacheManager::with_clock(config.cache, clock);
        let scheduler = ConcurrencyController::new(config.performance.max_concurrent_operations);

        info!(
            data_dir = %dir.root().display(),
            encrypted = format.is_encrypted(),
            compressed = format.is_compressed(),
            cache = config.cache.enabled,
            max_concurrent = config.performance.max_concurrent_operations,
            "storage engine connected"
        );

        Ok(Self {
            config,
            dir,
            format,
            cache,
            scheduler,
            stats: OperationStats::new(),
            write_gate: RwLock::new(()),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        self.dir.root()
    }

    /// Returns the document cache.
    #[must_use]
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Returns the admission controller.
    #[must_use]
    pub fn scheduler(&self) -> &ConcurrencyController {
        &self.scheduler
    }

    /// Returns the on-disk document format.
    #[must_use]
    pub fn format(&self) -> &DocumentFormat {
        &self.format
    }

    fn track<T>(&self, result: CoreResult<T>) -> CoreResult<T> {
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the documents of `collection` matching `query`.
    ///
    /// A collection that does not exist yields no documents. Documents are
    /// filtered as they are read; with a limit and no sort, reading stops
    /// once the page is filled.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CorruptDocument`] or
    /// [`CoreError::AuthenticationFailed`] on the first document read that
    /// does not decode.
    pub fn find(&self, collection: &str, query: &Query) -> CoreResult<Vec<Document>> {
        let result = self
            .scan(collection, |d| query.matches(d), query.match_budget())
            .map(|matched| query.arrange(matched));
        self.track(result)
    }

    /// Returns the documents of `collection` for which `predicate` holds.
    ///
    /// # Errors
    ///
    /// See [`StorageEngine::find`].
    pub fn find_where<F>(&self, collection: &str, predicate: F) -> CoreResult<Vec<Document>>
    where
        F: Fn(&Document) -> bool,
    {
        let result = self.scan(collection, predicate, None);
        self.track(result)
    }

    /// Decodes documents in id order, keeping those `keep` accepts, until
    /// `budget` of them are kept.
    fn scan<F>(&self, collection: &str, keep: F, budget: Option<usize>) -> CoreResult<Vec<Document>>
    where
        F: Fn(&Document) -> bool,
    {
        let collection = sanitize_collection(collection)?;
        let files = self
            .scheduler
            .schedule(|| self.dir.list_documents(&collection))?;
        self.stats.record_scan();

        let mut matched = Vec::new();
        let mut decoded = 0usize;
        for file in files {
            if budget.is_some_and(|n| matched.len() >= n) {
                break;
            }
            // Deleted since the listing.
            let Some(bytes) = self.scheduler.schedule(|| read_file(&file.path))? else {
                continue;
            };
            self.stats.record_read(bytes.len() as u64);
            let doc = self.format.decode(&collection, &file.id, &bytes)?;
            decoded += 1;
            if keep(&doc) {
                matched.push(doc);
            }
        }

        debug!(collection = %collection, decoded, matched = matched.len(), "collection scanned");
        Ok(matched)
    }

    /// Returns one document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no such document.
    pub fn find_by_id(&self, collection: &str, id: &str) -> CoreResult<Document> {
        let result = self.read_document(collection, id);
        self.track(result)
    }

    fn read_document(&self, collection: &str, id: &str) -> CoreResult<Document> {
        let collection = sanitize_collection(collection)?;
        validate_id(id)?;

        if let Some(doc) = self.cache.get(&collection, id) {
            debug!(collection = %collection, id, "cache hit");
            return Ok(doc);
        }

        let ticket = self.cache.read_ticket();
        let path = self.dir.document_path(&collection, id);
        let bytes = self
            .scheduler
            .schedule(|| read_file(&path))?
            .ok_or_else(|| CoreError::not_found(&collection, id))?;
        self.stats.record_read(bytes.len() as u64);

        let doc = self.format.decode(&collection, id, &bytes)?;
        if doc.id() != id {
            warn!(
                collection = %collection,
                id,
                embedded = doc.id(),
                "embedded id differs from file name; run validation with fix"
            );
        }
        self.cache.put_fresh(ticket, &collection, id, doc.clone());
        debug!(collection = %collection, id, bytes = bytes.len(), "document read");
        Ok(doc)
    }

    /// Returns true if the document exists on disk.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names.
    pub fn exists(&self, collection: &str, id: &str) -> CoreResult<bool> {
        let collection = sanitize_collection(collection)?;
        validate_id(id)?;
        Ok(self.dir.document_path(&collection, id).is_file())
    }

    /// Number of documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be listed.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        let collection = sanitize_collection(collection)?;
        Ok(self.dir.list_documents(&collection)?.len())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Stores a new document under its own `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateId`] if the id is taken and
    /// [`CoreError::InvalidId`] if it cannot be a file name.
    pub fn create(&self, collection: &str, document: Document) -> CoreResult<Document> {
        let result = self.create_inner(collection, document);
        self.track(result)
    }

    fn create_inner(&self, collection: &str, document: Document) -> CoreResult<Document> {
        let collection = sanitize_collection(collection)?;
        validate_id(document.id())?;
        let bytes = self.format.encode(&document)?;

        let _gate = self.write_gate.read();
        self.scheduler.schedule(|| -> CoreResult<()> {
            self.commit_create(&collection, document.id(), &bytes)?;
            sync_dir(&self.dir.collection_path(&collection))?;
            Ok(())
        })?;
        self.cache.invalidate(&collection, document.id());
        self.stats.record_write(bytes.len() as u64);

        debug!(collection = %collection, id = document.id(), bytes = bytes.len(), "document created");
        Ok(document)
    }

    /// Replaces a document. The stored `id` is always `id`, whatever the
    /// new contents say.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the document does not exist.
    pub fn update(&self, collection: &str, id: &str, document: Document) -> CoreResult<Document> {
        let result = self.update_inner(collection, id, document);
        self.track(result)
    }

    fn update_inner(&self, collection: &str, id: &str, mut document: Document) -> CoreResult<Document> {
        let collection = sanitize_collection(collection)?;
        validate_id(id)?;
        document.set_id(id);
        let bytes = self.format.encode(&document)?;

        let _gate = self.write_gate.read();
        self.scheduler.schedule(|| -> CoreResult<()> {
            self.commit_update(&collection, id, &bytes)?;
            sync_dir(&self.dir.collection_path(&collection))?;
            Ok(())
        })?;
        self.cache.invalidate(&collection, id);
        self.stats.record_write(bytes.len() as u64);

        debug!(collection = %collection, id, bytes = bytes.len(), "document updated");
        Ok(document)
    }

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the document does not exist.
    pub fn delete(&self, collection: &str, id: &str) -> CoreResult<()> {
        let result = self.delete_inner(collection, id);
        self.track(result)
    }

    fn delete_inner(&self, collection: &str, id: &str) -> CoreResult<()> {
        let collection = sanitize_collection(collection)?;
        validate_id(id)?;
        let path = self.dir.document_path(&collection, id);

        let _gate = self.write_gate.read();
        self.scheduler.schedule(|| -> CoreResult<()> {
            if !remove_file(&path)? {
                return Err(CoreError::not_found(&collection, id));
            }
            sync_dir(&self.dir.collection_path(&collection))?;
            Ok(())
        })?;
        self.cache.invalidate(&collection, id);
        self.stats.record_delete();

        debug!(collection = %collection, id, "document deleted");
        Ok(())
    }

    /// Applies creates and updates to one collection in chunks of
    /// `batch_size`.
    ///
    /// Each chunk is admitted as a single operation and made durable with
    /// a single directory sync. Operations apply in submission order and
    /// fail independently; the returned results line up with `ops`.
    ///
    /// # Errors
    ///
    /// The outer error is only for an invalid collection name.
    pub fn write_batch(
        &self,
        collection: &str,
        ops: Vec<WriteOp>,
    ) -> CoreResult<Vec<CoreResult<Document>>> {
        let collection = sanitize_collection(collection)?;
        let batch_size = self.config.performance.batch_size.max(1);
        let total = ops.len();

        let mut results = Vec::with_capacity(total);
        let mut pending = ops.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk: Vec<WriteOp> = pending.by_ref().take(batch_size).collect();
            let chunk_results = {
                let _gate = self.write_gate.read();
                self.scheduler.schedule(|| self.apply_chunk(&collection, chunk))
            };
            self.stats.record_batch();
            results.extend(chunk_results);
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(collection = %collection, ops = total, failed, "write batch applied");
        Ok(results)
    }

    fn apply_chunk(&self, collection: &str, chunk: Vec<WriteOp>) -> Vec<CoreResult<Document>> {
        let mut results: Vec<CoreResult<Document>> = chunk
            .into_iter()
            .map(|op| {
                let result = self.apply_op(collection, op);
                if result.is_err() {
                    self.stats.record_error();
                }
                result
            })
            .collect();

        let committed: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|d| d.id().to_string()))
            .collect();
        if committed.is_empty() {
            return results;
        }

        if let Err(e) = sync_dir(&self.dir.collection_path(collection)) {
            warn!(collection, error = %e, "directory sync failed after batch");
            let message = e.to_string();
            for result in results.iter_mut().filter(|r| r.is_ok()) {
                *result = Err(CoreError::Io(io::Error::other(message.clone())));
            }
        }
        for id in &committed {
            self.cache.invalidate(collection, id);
        }
        results
    }

    fn apply_op(&self, collection: &str, op: WriteOp) -> CoreResult<Document> {
        match op {
            WriteOp::Create(document) => {
                validate_id(document.id())?;
                let bytes = self.format.encode(&document)?;
                self.commit_create(collection, document.id(), &bytes)?;
                self.stats.record_write(bytes.len() as u64);
                Ok(document)
            }
            WriteOp::Update { id, mut document } => {
                validate_id(&id)?;
                document.set_id(&id);
                let bytes = self.format.encode(&document)?;
                self.commit_update(collection, &id, &bytes)?;
                self.stats.record_write(bytes.len() as u64);
                Ok(document)
            }
        }
    }

    /// Publishes a new document file. The caller syncs the directory.
    fn commit_create(&self, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<()> {
        let path = self.dir.document_path(collection, id);
        if path.exists() {
            return Err(CoreError::duplicate_id(collection, id));
        }
        self.ensure_collection(collection)?;
        if !StagedWrite::prepare(&path, bytes)?.commit_new()? {
            return Err(CoreError::duplicate_id(collection, id));
        }
        Ok(())
    }

    /// Replaces an existing document file. The caller syncs the directory.
    fn commit_update(&self, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<()> {
        let path = self.dir.document_path(collection, id);
        if !path.is_file() {
            return Err(CoreError::not_found(collection, id));
        }
        StagedWrite::prepare(&path, bytes)?.commit()?;
        Ok(())
    }

    fn ensure_collection(&self, collection: &str) -> CoreResult<()> {
        let path = self.dir.collection_path(collection);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            sync_dir(self.dir.root())?;
            debug!(collection, "collection created");
        }
        Ok(())
    }

    // ========================================================================
    // Collections and maintenance
    // ========================================================================

    /// Lists collection names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be listed.
    pub fn collections(&self) -> CoreResult<Vec<String>> {
        self.dir.list_collections()
    }

    /// Removes a collection and all its documents. Returns false if it did
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn drop_collection(&self, collection: &str) -> CoreResult<bool> {
        let collection = sanitize_collection(collection)?;
        let path = self.dir.collection_path(&collection);

        let gate = self.write_gate.read();
        let removed = self.scheduler.schedule(|| -> CoreResult<bool> {
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    sync_dir(self.dir.root())?;
                    Ok(true)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        });
        drop(gate);
        let removed = self.track(removed)?;
        self.cache.invalidate_collection(&collection);

        if removed {
            info!(collection = %collection, "collection dropped");
        }
        Ok(removed)
    }

    /// Walks the data directory and reports counts, merged with cache and
    /// operation counters.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn stats(&self) -> CoreResult<StatsSnapshot> {
        StatsSnapshot::collect(&self.dir, self.cache.stats(), self.stats.snapshot())
    }

    /// Empties the document cache.
    pub fn clear_cache(&self) {
        let entries = self.cache.len();
        self.cache.clear();
        debug!(entries, "cache cleared");
    }

    /// Removes the cache artifact directory from the data directory.
    /// Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn clear_cache_artifacts(&self) -> CoreResult<bool> {
        let path = self.dir.cache_artifact_path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = %path.display(), "cache artifacts removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks every document's embedded id against its file name, and
    /// repairs drift when `fix` is set.
    ///
    /// Each repair holds off this engine's writers, re-reads the file and
    /// only rewrites it if it is unchanged; a document updated meanwhile is
    /// checked again instead. Repaired documents are dropped from the cache.
    /// Writers in other processes are not excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk itself fails. Unreadable documents are
    /// reported, not returned as errors.
    pub fn validate(&self, fix: bool) -> CoreResult<ValidationReport> {
        let report = integrity::validate_with(
            self.dir.root(),
            &self.format,
            fix,
            |path, inspected, repaired| {
                let _gate = self.write_gate.write();
                self.scheduler
                    .schedule(|| integrity::replace_if_unchanged(path, inspected, repaired))
            },
        )?;
        for issue in report.issues.iter().filter(|i| i.fixed) {
            self.cache.invalidate(&issue.collection, &issue.id);
        }
        Ok(report)
    }

    /// Returns a backup manager for this store's directories.
    #[must_use]
    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::from_config(&self.config)
    }

    /// Shuts the engine down, dropping all cached documents.
    pub fn close(self) {
        self.cache.clear();
        info!(data_dir = %self.dir.root().display(), "storage engine closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::config::{CacheConfig, PerformanceConfig};
    use crate::query::SortOrder;
    use docvault_storage::EncryptionKey;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn engine_with(config: impl FnOnce(Config) -> Config) -> (StorageEngine, TempDir) {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::connect(config(Config::new(dir.path().join("data")))).unwrap();
        (engine, dir)
    }

    fn engine() -> (StorageEngine, TempDir) {
        engine_with(|c| c)
    }

    fn post(id: &str, title: &str) -> Document {
        Document::new(id).with("title", title)
    }

    #[test]
    fn posts_end_to_end() {
        let (engine, _dir) = engine();

        engine.create("posts", post("p1", "Hello")).unwrap();
        engine.create("posts", post("p2", "World")).unwrap();

        let found = engine
            .find("posts", &Query::new().where_eq("title", "Hello"))
            .unwrap();
        assert_eq!(found, vec![post("p1", "Hello")]);

        let updated = engine.update("posts", "p1", post("p1", "Hi")).unwrap();
        assert_eq!(updated.get("title"), Some(&json!("Hi")));
        assert_eq!(engine.find_by_id("posts", "p1").unwrap(), post("p1", "Hi"));

        engine.delete("posts", "p2").unwrap();
        assert!(engine.find_by_id("posts", "p2").unwrap_err().is_not_found());

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.collection("posts").unwrap().documents, 1);
    }

    #[test]
    fn documents_are_canonical_json_files() {
        let (engine, _dir) = engine();
        engine
            .create("posts", Document::new("p1").with("b", 2).with("a", 1))
            .unwrap();
        let raw = fs::read(engine.data_dir().join("posts/p1.json")).unwrap();
        assert_eq!(raw, br#"{"a":1,"b":2,"id":"p1"}"#);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "first")).unwrap();
        let err = engine.create("posts", post("p1", "second")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { ref id, .. } if id == "p1"));
        assert_eq!(engine.find_by_id("posts", "p1").unwrap(), post("p1", "first"));
    }

    #[test]
    fn update_and_delete_require_existing() {
        let (engine, _dir) = engine();
        assert!(engine
            .update("posts", "nope", post("nope", "x"))
            .unwrap_err()
            .is_not_found());
        assert!(engine.delete("posts", "nope").unwrap_err().is_not_found());
        assert!(!engine.data_dir().join("posts/nope.json").exists());
    }

    #[test]
    fn update_forces_path_id() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "a")).unwrap();
        let stored = engine.update("posts", "p1", post("other", "b")).unwrap();
        assert_eq!(stored.id(), "p1");
        assert_eq!(engine.find_by_id("posts", "p1").unwrap().id(), "p1");
        assert!(!engine.exists("posts", "other").unwrap());
    }

    #[test]
    fn missing_collection_is_empty() {
        let (engine, _dir) = engine();
        assert!(engine.find("ghosts", &Query::all()).unwrap().is_empty());
        assert_eq!(engine.count("ghosts").unwrap(), 0);
        assert!(engine.collections().unwrap().is_empty());
    }

    #[test]
    fn invalid_names_and_ids() {
        let (engine, _dir) = engine();
        assert!(matches!(
            engine.create("", post("p1", "x")),
            Err(CoreError::InvalidName { .. })
        ));
        assert!(matches!(
            engine.create("posts", Document::new("../evil")),
            Err(CoreError::InvalidId { .. })
        ));
        assert!(matches!(
            engine.find_by_id("posts", "a/b"),
            Err(CoreError::InvalidId { .. })
        ));
    }

    #[test]
    fn collection_names_are_sanitized() {
        let (engine, _dir) = engine();
        engine.create("user posts", post("p1", "x")).unwrap();
        assert_eq!(engine.collections().unwrap(), vec!["user_posts"]);
        assert!(engine.find_by_id("user_posts", "p1").is_ok());
    }

    #[test]
    fn find_with_sort_and_limit() {
        let (engine, _dir) = engine();
        for (id, views) in [("a", 5), ("b", 50), ("c", 20)] {
            engine
                .create("posts", Document::new(id).with("views", views))
                .unwrap();
        }
        let top = engine
            .find(
                "posts",
                &Query::new()
                    .gt("views", 1)
                    .sort_by("views", SortOrder::Descending)
                    .limit(2),
            )
            .unwrap();
        let ids: Vec<_> = top.iter().map(Document::id).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let few = engine
            .find_where("posts", |d| d.get("views") == Some(&json!(5)))
            .unwrap();
        assert_eq!(few.len(), 1);
    }

    #[test]
    fn corrupt_file_aborts_scan() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "ok")).unwrap();
        fs::write(engine.data_dir().join("posts/p2.json"), b"{broken").unwrap();

        let err = engine.find("posts", &Query::all()).unwrap_err();
        assert!(matches!(err, CoreError::CorruptDocument { ref id, .. } if id == "p2"));
        assert!(engine.find_by_id("posts", "p1").is_ok());
    }

    #[test]
    fn limited_find_reads_only_what_it_needs() {
        let (engine, _dir) = engine();
        for id in ["a", "b", "c"] {
            engine.create("posts", post(id, "ok")).unwrap();
        }
        fs::write(engine.data_dir().join("posts/z.json"), b"{broken").unwrap();
        let reads = engine.stats.reads();

        let page = engine.find("posts", &Query::all().limit(2)).unwrap();
        assert_eq!(page, vec![post("a", "ok"), post("b", "ok")]);
        assert_eq!(engine.stats.reads() - reads, 2);

        // Sorting needs every match, so the broken file is reached.
        let sorted = Query::all().sort_by("title", SortOrder::Ascending).limit(2);
        assert!(engine.find("posts", &sorted).unwrap_err().is_corruption());

        let filtered = engine
            .find_where("posts", |d| d.id() != "b")
            .map(|docs| docs.len());
        assert!(filtered.is_err());
    }

    #[test]
    fn stale_temp_file_is_ignored() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "old")).unwrap();

        // A crash between write and rename leaves only the temp file.
        let path = engine.data_dir().join("posts/p1.json");
        let bytes = engine.format().encode(&post("p1", "new")).unwrap();
        let temp = StagedWrite::prepare(&path, &bytes).unwrap().abandon();
        assert!(temp.exists());

        engine.clear_cache();
        assert_eq!(engine.find_by_id("posts", "p1").unwrap(), post("p1", "old"));
        assert_eq!(engine.find("posts", &Query::all()).unwrap().len(), 1);
        assert_eq!(engine.stats().unwrap().total_documents, 1);
    }

    #[test]
    fn reads_populate_cache_and_writes_invalidate() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "a")).unwrap();

        engine.find_by_id("posts", "p1").unwrap();
        engine.find_by_id("posts", "p1").unwrap();
        assert_eq!(engine.cache().hits(), 1);
        assert_eq!(engine.cache().len(), 1);

        engine.update("posts", "p1", post("p1", "b")).unwrap();
        assert_eq!(engine.cache().len(), 0);
        assert_eq!(engine.find_by_id("posts", "p1").unwrap(), post("p1", "b"));
    }

    #[test]
    fn cache_entries_expire() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let config = Config::new(dir.path()).cache(CacheConfig::default().ttl(Duration::from_secs(60)));
        let engine = StorageEngine::connect_with_clock(config, clock.clone()).unwrap();
        engine.create("posts", post("p1", "a")).unwrap();

        engine.find_by_id("posts", "p1").unwrap();
        clock.advance(Duration::from_secs(61));
        engine.find_by_id("posts", "p1").unwrap();

        assert_eq!(engine.cache().hits(), 0);
        assert_eq!(engine.cache().misses(), 2);
    }

    #[test]
    fn disabled_cache_still_reads() {
        let (engine, _dir) = engine_with(|c| c.cache(CacheConfig::disabled()));
        engine.create("posts", post("p1", "a")).unwrap();
        assert!(engine.find_by_id("posts", "p1").is_ok());
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn encrypted_and_compressed_store() {
        let key = EncryptionKey::generate();
        let (engine, dir) = engine_with(|c| c.encryption_key(key.clone()).compression(true));
        let doc = Document::new("s1").with("secret", "x".repeat(500));
        engine.create("vault", doc.clone()).unwrap();

        let raw = fs::read(engine.data_dir().join("vault/s1.json")).unwrap();
        assert!(!raw.windows(6).any(|w| w == b"secret"));
        assert_eq!(engine.find_by_id("vault", "s1").unwrap(), doc);

        // Reopening without the key cannot read the data.
        let plain = StorageEngine::connect(Config::new(dir.path().join("data"))).unwrap();
        assert!(plain.find_by_id("vault", "s1").unwrap_err().is_corruption());
    }

    #[test]
    fn tampered_file_fails_authentication() {
        let (engine, _dir) = engine_with(|c| c.encryption_key(EncryptionKey::generate()));
        engine.create("vault", post("s1", "x")).unwrap();
        engine.clear_cache();

        let path = engine.data_dir().join("vault/s1.json");
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        fs::write(&path, raw).unwrap();

        assert!(matches!(
            engine.find_by_id("vault", "s1"),
            Err(CoreError::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn write_batch_preserves_order() {
        let (engine, _dir) = engine_with(|c| c.performance(PerformanceConfig::default().batch_size(2)));
        engine.create("posts", post("existing", "x")).unwrap();

        let ops = vec![
            WriteOp::create(post("a", "1")),
            WriteOp::update("a", post("a", "2")),
            WriteOp::create(post("existing", "dup")),
            WriteOp::update("missing", post("missing", "x")),
            WriteOp::update("a", post("a", "3")),
        ];
        let results = engine.write_batch("posts", ops).unwrap();

        assert_eq!(results.len(), 5);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(CoreError::DuplicateId { .. })));
        assert!(matches!(results[3], Err(CoreError::NotFound { .. })));
        assert!(results[4].is_ok());
        assert_eq!(
            engine.find_by_id("posts", "a").unwrap().get("title"),
            Some(&json!("3"))
        );
        assert_eq!(engine.stats().unwrap().operations.batches, 3);
    }

    fn validate_fix_refreshes_cache() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "Hello")).unwrap();
        engine.find_by_id("posts", "p1").unwrap();
        let drifted = engine
            .format()
            .encode_value(&json!({"id": "wrong", "title": "Edited"}))
            .unwrap();
        fs::write(engine.data_dir().join("posts/p1.json"), drifted).unwrap();

        let report = engine.validate(true).unwrap();
        assert_eq!(report.fixed_count(), 1);
        assert_eq!(
            engine.find_by_id("posts", "p1").unwrap(),
            post("p1", "Edited")
        );
        assert!(engine.validate(false).unwrap().is_clean());
    }

    #[test]
    fn validate_fix_never_overwrites_updates() {
        let (engine, _dir) = engine();
        let engine = Arc::new(engine);
        let drifted = engine
            .format()
            .encode_value(&json!({"id": "wrong", "v": -1}))
            .unwrap();
        fs::create_dir_all(engine.data_dir().join("posts")).unwrap();
        fs::write(engine.data_dir().join("posts/p2.json"), drifted).unwrap();

        let writer = {
            let engine = engine.clone();
            thread::spawn(move || {
                for v in 0..50 {
                    engine
                        .update("posts", "p2", Document::new("p2").with("v", v))
                        .unwrap();
                }
            })
        };
        for _ in 0..20 {
            engine.validate(true).unwrap();
        }
        writer.join().unwrap();

        engine.clear_cache();
        let doc = engine.find_by_id("posts", "p2").unwrap();
        assert_eq!(doc, Document::new("p2").with("v", 49));
        assert!(engine.validate(false).unwrap().is_clean());
    }

    #[test]
    fn drop_collection_removes_everything() {
        let (engine, _dir) = engine();
        engine.create("posts", post("p1", "a")).unwrap();
        engine.find_by_id("posts", "p1").unwrap();

        assert!(engine.drop_collection("posts").unwrap());
        assert!(!engine.drop_collection("posts").unwrap());
        assert!(engine.cache().is_empty());
        assert!(engine.collections().unwrap().is_empty());
    }

    #[test]
    fn clear_cache_artifacts() {
        let (engine, _dir) = engine();
        assert!(!engine.clear_cache_artifacts().unwrap());
        fs::create_dir_all(engine.data_dir().join(".cache/blobs")).unwrap();
        assert!(engine.clear_cache_artifacts().unwrap());
        assert!(!engine.data_dir().join(".cache").exists());
    }

    #[test]
    fn concurrent_writers_respect_bound() {
        const LIMIT: usize = 2;
        let (engine, _dir) = engine_with(|c| {
            c.performance(PerformanceConfig::default().max_concurrent_operations(LIMIT))
        });
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let id = format!("t{t}-{i}");
                        engine.create("load", post(&id, "x")).unwrap();
                        engine.find_by_id("load", &id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.count("load").unwrap(), 80);
        assert!(engine.scheduler().peak_in_flight() <= LIMIT);
        assert_eq!(engine.scheduler().in_flight(), 0);
    }

    #[test]
    fn connect_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path())
            .performance(PerformanceConfig::default().max_concurrent_operations(0));
        assert!(matches!(
            StorageEngine::connect(config),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn connect_rejects_file_as_data_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            StorageEngine::connect(Config::new(&file)),
            Err(CoreError::InitializationError { .. })
        ));
    }

    #[test]
    fn errors_are_counted() {
        let (engine, _dir) = engine();
        let _ = engine.find_by_id("posts", "missing");
        let _ = engine.delete("posts", "missing");
        assert_eq!(engine.stats().unwrap().operations.errors, 2);
    }
}
