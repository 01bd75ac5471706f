//! # DocVault Storage
//!
//! Byte-level storage primitives for DocVault.
//!
//! This crate knows nothing about collections or documents. It provides:
//!
//! - [`StagedWrite`] / [`write_atomic`] - temp-file-then-rename writes, so a
//!   crash never leaves a half-written file under its real name
//! - [`Envelope`] - AES-256-GCM sealing of byte blobs at rest, or the
//!   identity function when encryption is off
//! - Directory helpers ([`sync_dir`], [`copy_dir_all`]) used by the engine
//!   and by backup/restore
//!
//! ## Example
//!
//! ```rust
//! use docvault_storage::{Envelope, EncryptionKey};
//!
//! let envelope = Envelope::new(&EncryptionKey::generate());
//! let sealed = envelope.seal(b"hello world").unwrap();
//! assert_eq!(envelope.open(&sealed).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod file;

pub use envelope::{
    is_sealed, open, seal, EncryptionKey, Envelope, ENVELOPE_MARKER, ENVELOPE_OVERHEAD,
    KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::{StorageError, StorageResult};
pub use file::{
    copy_dir_all, is_temp_file, read_file, remove_file, sync_dir, temp_path_for, write_atomic,
    CopyStats, StagedWrite, TEMP_SUFFIX,
};
