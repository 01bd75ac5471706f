//! Bytes-to-document pipeline: encode then seal on the way out, open then
//! decode on the way in.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use docvault_codec::{Document, DocumentCodec};
use docvault_storage::{EncryptionKey, Envelope, StorageError};
use serde_json::Value;

/// How documents are stored on disk.
#[derive(Debug)]
pub struct DocumentFormat {
    codec: DocumentCodec,
    envelope: Envelope,
}

impl DocumentFormat {
    /// Plain JSON, optionally compressed, optionally sealed.
    #[must_use]
    pub fn new(compression: bool, key: Option<&EncryptionKey>) -> Self {
        Self {
            codec: DocumentCodec::new(compression),
            envelope: Envelope::from_key(key),
        }
    }

    /// The format a [`Config`] describes.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.performance.enable_compression,
            config.encryption.active_key(),
        )
    }

    /// Returns true if documents are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.envelope.is_enabled()
    }

    /// Returns true if new writes are compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.codec.compression()
    }

    /// Encodes and seals a document.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or sealing fails.
    pub fn encode(&self, doc: &Document) -> CoreResult<Vec<u8>> {
        let plain = self.codec.encode(doc)?;
        Ok(self.envelope.seal(&plain)?)
    }

    /// Encodes and seals an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or sealing fails.
    pub fn encode_value(&self, value: &Value) -> CoreResult<Vec<u8>> {
        let plain = self.codec.encode_value(value)?;
        Ok(self.envelope.seal(&plain)?)
    }

    /// Opens and decodes the bytes of `collection/id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthenticationFailed`] if the seal does not
    /// verify and [`CoreError::CorruptDocument`] for any other decode
    /// failure.
    pub fn decode(&self, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<Document> {
        let plain = self.open(collection, id, bytes)?;
        self.codec
            .decode(&plain)
            .map_err(|e| CoreError::corrupt(collection, id, e))
    }

    /// Like [`DocumentFormat::decode`] but without requiring a valid `id`.
    ///
    /// # Errors
    ///
    /// See [`DocumentFormat::decode`].
    pub fn decode_value(&self, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<Value> {
        let plain = self.open(collection, id, bytes)?;
        self.codec
            .decode_value(&plain)
            .map_err(|e| CoreError::corrupt(collection, id, e))
    }

    fn open(&self, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<Vec<u8>> {
        self.envelope.open(bytes).map_err(|e| match e {
            StorageError::AuthenticationFailed => CoreError::authentication_failed(collection, id),
            other if other.is_data_corruption() => CoreError::corrupt(collection, id, other),
            other => CoreError::Storage(other),
        })
    }
}
