//! Canonical document encoder.

use crate::document::Document;
use crate::error::{CodecError, CodecResult};
use serde_json::Value;

/// Marker prefixed to compressed documents.
pub const COMPRESSED_MARKER: [u8; 4] = *b"DVZ1";

/// Encode a JSON value to canonical bytes.
///
/// The output is deterministic:
/// - Object keys are written in bytewise-sorted order
/// - No whitespace between tokens
/// - Numbers and strings use `serde_json`'s stable formatting
///
/// Equal values always produce identical bytes, which makes content hashes
/// comparable across runs and machines.
///
/// # Errors
///
/// Returns an error if a scalar cannot be written.
pub fn to_canonical_json(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical JSON encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.extend_from_slice(b"null"),
            Value::Bool(true) => self.buffer.extend_from_slice(b"true"),
            Value::Bool(false) => self.buffer.extend_from_slice(b"false"),
            Value::Number(_) | Value::String(_) => self.encode_scalar(value)?,
            Value::Array(items) => {
                self.buffer.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(b',');
                    }
                    self.encode(item)?;
                }
                self.buffer.push(b']');
            }
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

                self.buffer.push(b'{');
                for (i, (key, item)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(b',');
                    }
                    serde_json::to_writer(&mut self.buffer, key)
                        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
                    self.buffer.push(b':');
                    self.encode(item)?;
                }
                self.buffer.push(b'}');
            }
        }
        Ok(())
    }

    fn encode_scalar(&mut self, value: &Value) -> CodecResult<()> {
        serde_json::to_writer(&mut self.buffer, value)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a document, compressing it when `compress` is set.
pub(crate) fn encode_document(doc: &Document, compress: bool) -> CodecResult<Vec<u8>> {
    let plain = to_canonical_json(&Value::Object(doc.fields().clone()))?;
    if !compress {
        return Ok(plain);
    }
    Ok(compress_block(&plain))
}

/// Wraps canonical bytes in the compressed format.
pub(crate) fn compress_block(plain: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::compress_prepend_size(plain);
    let mut out = Vec::with_capacity(COMPRESSED_MARKER.len() + compressed.len());
    out.extend_from_slice(&COMPRESSED_MARKER);
    out.extend(compressed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let bytes = to_canonical_json(&json!({"b": 1, "a": {"z": true, "y": null}})).unwrap();
        assert_eq!(bytes, br#"{"a":{"y":null,"z":true},"b":1}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let bytes = to_canonical_json(&json!({"q": "say \"hi\"\n"})).unwrap();
        assert_eq!(bytes, br#"{"q":"say \"hi\"\n"}"#);
    }

    #[test]
    fn arrays_keep_order() {
        let bytes = to_canonical_json(&json!([3, 1, 2])).unwrap();
        assert_eq!(bytes, b"[3,1,2]");
    }

    #[test]
    fn compressed_output_has_marker() {
        let doc = Document::new("c").with("body", "x".repeat(200));
        let bytes = encode_document(&doc, true).unwrap();
        assert_eq!(&bytes[..4], &COMPRESSED_MARKER);
        assert!(bytes.len() < 200);
    }
}
