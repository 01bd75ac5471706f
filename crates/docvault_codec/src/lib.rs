//! # DocVault Codec
//!
//! Document encoding/decoding for DocVault.
//!
//! This crate turns [`Document`]s into the bytes stored on disk and back:
//! - Canonical JSON: sorted keys, no whitespace, identical inputs produce
//!   identical bytes
//! - Optional LZ4 compression behind a 4-byte format marker
//! - Decoding never yields a partial document; bad bytes are an error
//!
//! ## On-disk formats
//!
//! ```text
//! plain:      {"id":"p1","title":"Hello"}
//! compressed: "DVZ1" | u32 LE plain length | LZ4 block
//! ```
//!
//! The decoder accepts both formats regardless of the codec's current
//! compression setting, so toggling compression never strands old files.
//!
//! ## Usage
//!
//! ```
//! use docvault_codec::{Document, DocumentCodec};
//! use serde_json::json;
//!
//! let codec = DocumentCodec::new(true);
//! let doc = Document::from_value(json!({"id": "p1", "title": "Hello"})).unwrap();
//!
//! let bytes = codec.encode(&doc).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;

pub use decoder::{decode_document, decode_value, is_compressed, MAX_DOCUMENT_SIZE};
pub use document::{Document, ID_FIELD};
pub use encoder::{to_canonical_json, CanonicalEncoder, COMPRESSED_MARKER};
pub use error::{CodecError, CodecResult};

use sha2::{Digest, Sha256};

/// Encodes and decodes documents with a fixed compression setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentCodec {
    compression: bool,
}

impl DocumentCodec {
    /// Creates a codec; `compression` controls the encode side only.
    #[must_use]
    pub const fn new(compression: bool) -> Self {
        Self { compression }
    }

    /// Returns whether encoded output is compressed.
    #[must_use]
    pub const fn compression(&self) -> bool {
        self.compression
    }

    /// Encodes a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn encode(&self, doc: &Document) -> CodecResult<Vec<u8>> {
        encoder::encode_document(doc, self.compression)
    }

    /// Encodes an arbitrary JSON value with the same rules as documents.
    ///
    /// Used when rewriting files whose body is not a valid [`Document`]
    /// yet, such as a record whose `id` is being repaired.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn encode_value(&self, value: &serde_json::Value) -> CodecResult<Vec<u8>> {
        let plain = to_canonical_json(value)?;
        if self.compression {
            Ok(encoder::compress_block(&plain))
        } else {
            Ok(plain)
        }
    }

    /// Decodes a document.
    ///
    /// # Errors
    ///
    /// See [`decode_document`].
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Document> {
        decode_document(bytes)
    }

    /// Decodes a raw JSON value without requiring an `id`.
    ///
    /// # Errors
    ///
    /// See [`decode_value`].
    pub fn decode_value(&self, bytes: &[u8]) -> CodecResult<serde_json::Value> {
        decode_value(bytes)
    }
}

/// Returns the hex-encoded SHA-256 of encoded document bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
