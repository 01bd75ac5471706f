//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The authentication tag did not verify.
    ///
    /// The sealed bytes were corrupted or tampered with, or were sealed
    /// under a different key. This is never a "try another key" signal.
    #[error("authentication failed: ciphertext was corrupted or tampered with")]
    AuthenticationFailed,

    /// The bytes are not a well-formed envelope.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope {
        /// Description of the problem.
        message: String,
    },

    /// The supplied key material is unusable.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a malformed envelope error.
    pub fn malformed_envelope(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Returns true if this error means stored bytes are unreadable
    /// (tampered, truncated or not an envelope) rather than an I/O fault.
    #[must_use]
    pub fn is_data_corruption(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::MalformedEnvelope { .. }
        )
    }
}
