//! Benchmark utilities.

use docvault_core::{Config, Document, StorageEngine};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tempfile::TempDir;

/// Generate a random alphanumeric string of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A document whose `body` field holds `payload_size` random characters.
pub fn sample_document(id: impl Into<String>, payload_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    Document::new(id)
        .with("title", random_text(16))
        .with("views", rng.gen_range(0..10_000u32))
        .with("published", rng.gen::<bool>())
        .with("body", random_text(payload_size))
}

/// Generate `count` documents with ids `d0..d{count-1}`.
pub fn generate_documents(count: usize, payload_size: usize) -> Vec<Document> {
    (0..count)
        .map(|i| sample_document(format!("d{i}"), payload_size))
        .collect()
}

/// Opens an engine in a fresh temp directory. Keep the `TempDir` alive
/// for as long as the engine is used.
pub fn scratch_engine(configure: impl FnOnce(Config) -> Config) -> (StorageEngine, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let config = configure(Config::new(dir.path().join("data")));
    let engine = StorageEngine::connect(config).expect("Failed to open engine");
    (engine, dir)
}
