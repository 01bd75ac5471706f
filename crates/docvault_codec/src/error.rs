//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
///
/// Every decoding variant means the bytes on disk do not hold a usable
/// document. Callers surface these as corrupt documents; they are never
/// "repaired" by guessing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The bytes are not valid JSON.
    #[error("malformed JSON: {message}")]
    MalformedJson {
        /// Description of the parse error.
        message: String,
    },

    /// Input ended before a complete document was read.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The compressed block could not be decompressed.
    #[error("decompression failed: {message}")]
    DecompressionFailed {
        /// Description of the decompression error.
        message: String,
    },

    /// The decoded value is not a JSON object.
    #[error("document must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },

    /// The document has no string `id` field.
    #[error("document has no string `id` field")]
    MissingId,

    /// The declared document size exceeds the codec limit.
    #[error("document too large: {size} bytes exceeds limit of {max}")]
    TooLarge {
        /// Declared size in bytes.
        size: usize,
        /// Maximum permitted size in bytes.
        max: usize,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a malformed JSON error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJson {
            message: message.into(),
        }
    }

    /// Create a decompression failed error.
    pub fn decompression_failed(message: impl Into<String>) -> Self {
        Self::DecompressionFailed {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() {
            Self::UnexpectedEof
        } else {
            Self::malformed(err.to_string())
        }
    }
}
