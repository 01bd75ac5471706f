//! The document type stored by DocVault.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the mandatory identity field.
pub const ID_FIELD: &str = "id";

/// A JSON object with a mandatory string `id`.
///
/// The invariant "this is an object and `id` is a string" holds for every
/// `Document` value; constructors and mutators that could break it return
/// an error instead.
///
/// # Example
///
/// ```
/// use docvault_codec::Document;
/// use serde_json::json;
///
/// let doc = Document::from_value(json!({"id": "p1", "title": "Hello"})).unwrap();
/// assert_eq!(doc.id(), "p1");
/// assert_eq!(doc.get("title"), Some(&json!("Hello")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Creates a document holding only an `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_string(), Value::String(id.into()));
        Self { fields }
    }

    /// Builds a document from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotAnObject`] for non-objects and
    /// [`CodecError::MissingId`] when `id` is absent or not a string.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        match value {
            Value::Object(fields) => Self::from_map(fields),
            other => Err(CodecError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Builds a document from a JSON object map.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingId`] when `id` is absent or not a string.
    pub fn from_map(fields: Map<String, Value>) -> CodecResult<Self> {
        match fields.get(ID_FIELD) {
            Some(Value::String(_)) => Ok(Self { fields }),
            _ => Err(CodecError::MissingId),
        }
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Replaces the document id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Resolves a dotted path such as `author.name` against nested objects.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a top-level field, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingId`] if `field` is `id` and `value` is
    /// not a string.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> CodecResult<Option<Value>> {
        let field = field.into();
        let value = value.into();
        if field == ID_FIELD && !value.is_string() {
            return Err(CodecError::MissingId);
        }
        Ok(self.fields.insert(field, value))
    }

    /// Builder form of [`insert`](Self::insert) for non-`id` fields.
    ///
    /// Attempts to replace `id` with a non-string are ignored.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.insert(field, value);
        self
    }

    /// Removes a top-level field. The `id` field cannot be removed.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return None;
        }
        self.fields.remove(field)
    }

    /// Returns all fields, including `id`.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Converts the document into a plain JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Document {
    type Error = CodecError;

    fn try_from(value: Value) -> CodecResult<Self> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

/// Returns the JSON type name of a value, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_has_only_id() {
        let doc = Document::new("a1");
        assert_eq!(doc.id(), "a1");
        assert_eq!(doc.fields().len(), 1);
    }

    #[test]
    fn from_value_requires_object() {
        let err = Document::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err, CodecError::NotAnObject { found: "array" });
    }

    #[test]
    fn from_value_requires_string_id() {
        assert_eq!(
            Document::from_value(json!({"title": "x"})).unwrap_err(),
            CodecError::MissingId
        );
        assert_eq!(
            Document::from_value(json!({"id": 7})).unwrap_err(),
            CodecError::MissingId
        );
    }

    #[test]
    fn insert_rejects_non_string_id() {
        let mut doc = Document::new("a");
        assert!(doc.insert("id", 5).is_err());
        assert_eq!(doc.id(), "a");

        doc.insert("id", "b").unwrap();
        assert_eq!(doc.id(), "b");
    }

    #[test]
    fn id_cannot_be_removed() {
        let mut doc = Document::new("a").with("x", 1);
        assert_eq!(doc.remove("id"), None);
        assert_eq!(doc.remove("x"), Some(json!(1)));
        assert_eq!(doc.id(), "a");
    }

    #[test]
    fn dotted_paths() {
        let doc = Document::from_value(json!({
            "id": "p",
            "author": {"name": "Ada", "tags": ["x", "y"]}
        }))
        .unwrap();

        assert_eq!(doc.get_path("author.name"), Some(&json!("Ada")));
        assert_eq!(doc.get_path("author.tags.1"), Some(&json!("y")));
        assert_eq!(doc.get_path("author.missing"), None);
        assert_eq!(doc.get_path("id.deeper"), None);
    }

    #[test]
    fn serde_goes_through_validation() {
        let doc: Document = serde_json::from_value(json!({"id": "s", "n": 1})).unwrap();
        assert_eq!(doc.id(), "s");

        let bad: Result<Document, _> = serde_json::from_value(json!({"n": 1}));
        assert!(bad.is_err());

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back, json!({"id": "s", "n": 1}));
    }
}
