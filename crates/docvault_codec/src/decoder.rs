//! Document decoder.

use crate::document::Document;
use crate::encoder::COMPRESSED_MARKER;
use crate::error::{CodecError, CodecResult};
use serde_json::Value;

/// Largest decompressed document the decoder will allocate for (64 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// Returns true if `bytes` carry the compressed-format marker.
#[must_use]
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&COMPRESSED_MARKER)
}

/// Decodes bytes to a raw JSON value, undoing compression if present.
///
/// The whole input must be one JSON value; trailing bytes are an error.
///
/// # Errors
///
/// Returns an error for truncated, malformed or undecompressable input.
pub fn decode_value(bytes: &[u8]) -> CodecResult<Value> {
    if is_compressed(bytes) {
        let plain = decompress_block(&bytes[COMPRESSED_MARKER.len()..])?;
        return Ok(serde_json::from_slice(&plain)?);
    }
    if bytes.is_empty() {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Decodes bytes to a [`Document`].
///
/// # Errors
///
/// Returns everything [`decode_value`] does, plus
/// [`CodecError::NotAnObject`] and [`CodecError::MissingId`].
pub fn decode_document(bytes: &[u8]) -> CodecResult<Document> {
    Document::from_value(decode_value(bytes)?)
}

fn decompress_block(block: &[u8]) -> CodecResult<Vec<u8>> {
    if block.len() < 4 {
        return Err(CodecError::UnexpectedEof);
    }
    let declared = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) as usize;
    if declared > MAX_DOCUMENT_SIZE {
        return Err(CodecError::TooLarge {
            size: declared,
            max: MAX_DOCUMENT_SIZE,
        });
    }
    lz4_flex::decompress_size_prepended(block)
        .map_err(|e| CodecError::decompression_failed(e.to_string()))
}
