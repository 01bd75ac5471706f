//! Error types for DocVault core.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocVault core operations.
///
/// The engine never recovers from these internally. Every variant tied to a
/// document names its collection and id so callers can log and act.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage primitive error.
    #[error("storage error: {0}")]
    Storage(#[from] docvault_storage::StorageError),

    /// Codec error outside the context of a stored document.
    #[error("codec error: {0}")]
    Codec(#[from] docvault_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data directory is missing, not a directory, or not writable.
    #[error("cannot initialize data directory {path}: {message}")]
    InitializationError {
        /// The configured data directory.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The document does not exist.
    #[error("document not found: {id} in collection {collection}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Document id.
        id: String,
    },

    /// A document with this id already exists.
    #[error("duplicate id: {id} already exists in collection {collection}")]
    DuplicateId {
        /// Collection written to.
        collection: String,
        /// Conflicting id.
        id: String,
    },

    /// The stored bytes do not decode to a document.
    #[error("corrupt document {id} in collection {collection}: {reason}")]
    CorruptDocument {
        /// Collection holding the document.
        collection: String,
        /// Document id (from the file name).
        id: String,
        /// Underlying decode failure.
        reason: String,
    },

    /// The encryption tag did not verify: corruption or tampering.
    #[error("authentication failed for document {id} in collection {collection}")]
    AuthenticationFailed {
        /// Collection holding the document.
        collection: String,
        /// Document id (from the file name).
        id: String,
    },

    /// A quota was exceeded. Reserved; nothing enforces quotas yet.
    #[error("capacity exceeded: {message}")]
    CapacityExceeded {
        /// Description of the exhausted resource.
        message: String,
    },

    /// A collection name cannot be turned into a safe path segment.
    #[error("invalid collection name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A document id cannot be used as a file name.
    #[error("invalid document id {id:?}: {reason}")]
    InvalidId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A document cannot be stored as given.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A destructive operation needs explicit confirmation.
    #[error("refusing to overwrite {path} without confirmation")]
    ConfirmationRequired {
        /// What would have been overwritten.
        path: PathBuf,
    },

    /// A backup set is missing or unreadable.
    #[error("invalid backup at {path}: {message}")]
    InvalidBackup {
        /// Backup location.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// An operation gave up waiting for an admission slot.
    #[error("timed out after {waited:?} waiting for an operation slot")]
    AdmissionTimeout {
        /// How long the caller waited.
        waited: Duration,
    },
}

impl CoreError {
    /// Creates an initialization error.
    pub fn initialization(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InitializationError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a duplicate-id error.
    pub fn duplicate_id(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a corrupt-document error.
    pub fn corrupt(
        collection: impl Into<String>,
        id: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::CorruptDocument {
            collection: collection.into(),
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an authentication-failed error.
    pub fn authentication_failed(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid collection name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid backup error.
    pub fn invalid_backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidBackup {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error means stored bytes are unreadable.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptDocument { .. } | Self::AuthenticationFailed { .. }
        )
    }
}
