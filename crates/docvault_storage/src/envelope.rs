//! Encryption envelope for documents at rest.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - A fresh random 96-bit nonce per seal, stored with the ciphertext
//! - The format marker is bound as associated data
//! - Keys are zeroized on drop and redacted from `Debug` output
//! - Keys are never written to disk; the application supplies them
//!
//! ## Sealed Layout
//!
//! ```text
//! | "DVE1" (4) | nonce (12) | ciphertext (n) | tag (16) |
//! ```

use crate::error::{StorageError, StorageResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of a GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of a GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Marker that prefixes every sealed document.
pub const ENVELOPE_MARKER: [u8; 4] = *b"DVE1";
/// Bytes of overhead a sealed document carries over its plaintext.
pub const ENVELOPE_OVERHEAD: usize = ENVELOPE_MARKER.len() + NONCE_SIZE + TAG_SIZE;

const HKDF_INFO: &[u8] = b"docvault-envelope-key-v1";

/// A 256-bit document encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::invalid_key(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Parses a key from 64 hexadecimal characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or has the wrong length.
    pub fn from_hex(text: &str) -> StorageResult<Self> {
        let mut decoded = hex::decode(text.trim())
            .map_err(|e| StorageError::invalid_key(format!("not a hex key: {e}")))?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// HKDF is not a password hash; the passphrase should already carry
    /// high entropy (a generated secret, not a user-chosen word).
    ///
    /// # Errors
    ///
    /// Returns an error if the passphrase is empty.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        if passphrase.is_empty() {
            return Err(StorageError::invalid_key("passphrase is empty"));
        }

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|_| StorageError::invalid_key("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Do not log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Returns true if `bytes` start with the envelope marker.
#[must_use]
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(&ENVELOPE_MARKER)
}

/// Seals `plaintext` under `key`.
///
/// # Errors
///
/// Returns an error if the cipher fails.
pub fn seal(plaintext: &[u8], key: &EncryptionKey) -> StorageResult<Vec<u8>> {
    Envelope::new(key).seal(plaintext)
}

/// Opens bytes produced by [`seal`].
///
/// # Errors
///
/// Returns [`StorageError::AuthenticationFailed`] if the tag does not verify.
pub fn open(ciphertext: &[u8], key: &EncryptionKey) -> StorageResult<Vec<u8>> {
    Envelope::new(key).open(ciphertext)
}

/// Wraps and unwraps document bytes.
///
/// A disabled envelope is the identity function, so the layers above
/// never branch on whether encryption is configured.
pub struct Envelope {
    cipher: Option<Aes256Gcm>,
}

impl Envelope {
    /// Creates an envelope that encrypts with `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self {
            cipher: Some(cipher),
        }
    }

    /// Creates a pass-through envelope.
    #[must_use]
    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    /// Creates an envelope from an optional key.
    #[must_use]
    pub fn from_key(key: Option<&EncryptionKey>) -> Self {
        key.map_or_else(Self::disabled, Self::new)
    }

    /// Returns whether this envelope encrypts.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Seals plaintext. Identity when disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    pub fn seal(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_vec());
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &ENVELOPE_MARKER,
                },
            )
            .map_err(|_| StorageError::encryption_failed("AES-GCM encryption error"))?;

        let mut sealed = Vec::with_capacity(ENVELOPE_OVERHEAD + plaintext.len());
        sealed.extend_from_slice(&ENVELOPE_MARKER);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Opens sealed bytes. Identity when disabled, except that sealed
    /// input is refused rather than handed upward as a document.
    ///
    /// When enabled, anything that does not verify is an authentication
    /// failure: a flipped marker bit, a truncated nonce and a bad tag are
    /// all the same tampering signal.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AuthenticationFailed`] if the bytes do not verify
    /// - [`StorageError::MalformedEnvelope`] if sealed bytes reach a
    ///   disabled envelope
    pub fn open(&self, bytes: &[u8]) -> StorageResult<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            if is_sealed(bytes) {
                return Err(StorageError::malformed_envelope(
                    "document is encrypted but no key is configured",
                ));
            }
            return Ok(bytes.to_vec());
        };

        if !is_sealed(bytes) || bytes.len() < ENVELOPE_OVERHEAD {
            return Err(StorageError::AuthenticationFailed);
        }

        let nonce_start = ENVELOPE_MARKER.len();
        let nonce = Nonce::from_slice(&bytes[nonce_start..nonce_start + NONCE_SIZE]);
        let payload = Payload {
            msg: &bytes[nonce_start + NONCE_SIZE..],
            aad: &ENVELOPE_MARKER,
        };

        cipher
            .decrypt(nonce, payload)
            .map_err(|_| StorageError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("cipher", &self.cipher.as_ref().map(|_| "Aes256Gcm"))
            .finish()
    }
}
