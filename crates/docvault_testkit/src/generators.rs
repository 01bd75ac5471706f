//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents, ids and collection names
//! that the engine accepts.

use docvault_codec::{Document, ID_FIELD};
use proptest::prelude::*;
use serde_json::{Map, Number, Value};

/// Strategy for generating valid document ids.
///
/// Lowercase only, so distinct ids stay distinct on case-insensitive
/// filesystems.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_.-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating collection names that sanitize to themselves.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating JSON scalars, including floats that must
/// survive a round trip exactly.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<u64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>()
            .prop_filter_map("finite floats only", Number::from_f64)
            .prop_map(Value::Number),
        ".{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for generating nested JSON values.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Strategy for generating documents with arbitrary extra fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        document_id_strategy(),
        prop::collection::btree_map("[a-z][a-z0-9_]{0,11}", json_value_strategy(), 0..8),
    )
        .prop_map(|(id, fields)| {
            let mut map: Map<String, Value> = fields.into_iter().collect();
            map.insert(ID_FIELD.to_string(), Value::String(id));
            Document::from_map(map).expect("id is a string")
        })
}

/// Strategy for generating a set of documents with distinct ids.
pub fn distinct_documents_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(document_strategy(), 0..max).prop_map(|docs| {
        let mut seen = std::collections::HashSet::new();
        docs.into_iter()
            .filter(|d| seen.insert(d.id().to_string()))
            .collect()
    })
}
