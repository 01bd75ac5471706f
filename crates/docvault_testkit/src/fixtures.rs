//! Test fixtures and store helpers.
//!
//! Provides scratch stores that clean up after themselves and a few
//! canned documents.

use docvault_core::{
    CacheConfig, Clock, Config, Document, EncryptionKey, ManualClock, PerformanceConfig,
    StorageEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A store in a temporary directory, removed on drop.
pub struct TestStore {
    /// The engine.
    pub engine: StorageEngine,
    /// Clock driving cache expiry, when created with [`TestStore::with_manual_clock`].
    pub clock: Option<Arc<ManualClock>>,
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates a store with default settings.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a store, letting `configure` adjust the defaults.
    ///
    /// The data directory is always inside the scratch directory.
    pub fn with_config(configure: impl FnOnce(Config) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(Config::new(temp_dir.path().join("data")));
        let engine = StorageEngine::connect(config).expect("Failed to connect test store");
        Self {
            engine,
            clock: None,
            temp_dir,
        }
    }

    /// Creates a store whose cache reads time from a manual clock.
    pub fn with_manual_clock(cache: CacheConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new());
        let config = Config::new(temp_dir.path().join("data")).cache(cache);
        let engine = StorageEngine::connect_with_clock(config, clock.clone() as Arc<dyn Clock>)
            .expect("Failed to connect test store");
        Self {
            engine,
            clock: Some(clock),
            temp_dir,
        }
    }

    /// Creates an encrypted store with a fresh random key.
    pub fn encrypted() -> (Self, EncryptionKey) {
        let key = EncryptionKey::generate();
        let store = Self::with_config(|config| config.encryption_key(key.clone()));
        (store, key)
    }

    /// Creates a store admitting at most `max` concurrent operations.
    pub fn bounded(max: usize) -> Self {
        Self::with_config(|config| {
            config.performance(PerformanceConfig::default().max_concurrent_operations(max))
        })
    }

    /// The scratch directory (parent of the data directory).
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of a document file.
    pub fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.engine
            .data_dir()
            .join(collection)
            .join(format!("{id}.json"))
    }

    /// Reopens the same directory with a new configuration, closing this
    /// engine first.
    pub fn reopen(self, configure: impl FnOnce(Config) -> Config) -> Self {
        let Self {
            engine, temp_dir, ..
        } = self;
        let data_dir = engine.data_dir().to_path_buf();
        engine.close();
        let engine =
            StorageEngine::connect(configure(Config::new(data_dir))).expect("Failed to reopen");
        Self {
            engine,
            clock: None,
            temp_dir,
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = StorageEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary store.
///
/// # Example
///
/// ```rust,ignore
/// use docvault_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store.create("posts", post("p1", "Hello")).unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&StorageEngine) -> R,
{
    let store = TestStore::new();
    f(&store)
}

/// A blog post document.
pub fn post(id: &str, title: &str) -> Document {
    Document::new(id).with("title", title)
}

/// Creates `count` posts `p0..p{count-1}` with a `views` field equal to
/// the index.
pub fn seed_posts(engine: &StorageEngine, count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let doc = post(&format!("p{i}"), &format!("Post {i}")).with("views", i);
            engine.create("posts", doc).expect("Failed to seed post")
        })
        .collect()
}
