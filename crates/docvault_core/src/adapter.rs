//! The contract a host application codes against.

use crate::config::Config;
use crate::engine::StorageEngine;
use crate::error::CoreResult;
use crate::query::Query;
use crate::stats::StatsSnapshot;
use docvault_codec::Document;

/// A document store backend.
///
/// Hosts hold a `Box<dyn DocumentAdapter>` (or a concrete type) so the
/// file-backed engine can be swapped for another backend without touching
/// call sites.
pub trait DocumentAdapter: Send + Sync {
    /// Opens the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    fn connect(config: Config) -> CoreResult<Self>
    where
        Self: Sized;

    /// Documents of `collection` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be read.
    fn find(&self, collection: &str, query: &Query) -> CoreResult<Vec<Document>>;

    /// One document by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such document.
    fn find_by_id(&self, collection: &str, id: &str) -> CoreResult<Document>;

    /// Stores a new document.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the id is taken.
    fn create(&self, collection: &str, document: Document) -> CoreResult<Document>;

    /// Replaces a document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such document.
    fn update(&self, collection: &str, id: &str, document: Document) -> CoreResult<Document>;

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such document.
    fn delete(&self, collection: &str, id: &str) -> CoreResult<()>;

    /// Store-wide counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be inspected.
    fn stats(&self) -> CoreResult<StatsSnapshot>;
}

impl DocumentAdapter for StorageEngine {
    fn connect(config: Config) -> CoreResult<Self> {
        StorageEngine::connect(config)
    }

    fn find(&self, collection: &str, query: &Query) -> CoreResult<Vec<Document>> {
        StorageEngine::find(self, collection, query)
    }

    fn find_by_id(&self, collection: &str, id: &str) -> CoreResult<Document> {
        StorageEngine::find_by_id(self, collection, id)
    }

    fn create(&self, collection: &str, document: Document) -> CoreResult<Document> {
        StorageEngine::create(self, collection, document)
    }

    fn update(&self, collection: &str, id: &str, document: Document) -> CoreResult<Document> {
        StorageEngine::update(self, collection, id, document)
    }

    fn delete(&self, collection: &str, id: &str) -> CoreResult<()> {
        StorageEngine::delete(self, collection, id)
    }

    fn stats(&self) -> CoreResult<StatsSnapshot> {
        StorageEngine::stats(self)
    }
}
