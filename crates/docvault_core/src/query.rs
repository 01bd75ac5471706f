//! In-memory query evaluation for collection scans.
//!
//! A [`Query`] is a conjunction of field predicates plus optional sort,
//! offset and limit. Field names may be dotted paths (`author.name`,
//! `tags.0`).
//!
//! Comparisons follow JSON types: numbers compare numerically (`1 == 1.0`),
//! strings lexicographically, booleans `false < true`. Ordering predicates
//! between different types never match.

use docvault_codec::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// A test applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field is missing or differs from the value.
    Ne(Value),
    /// Field is greater than the value.
    Gt(Value),
    /// Field is greater than or equal to the value.
    Gte(Value),
    /// Field is less than the value.
    Lt(Value),
    /// Field is less than or equal to the value.
    Lte(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
    /// String field contains the substring, or array field contains the
    /// value.
    Contains(Value),
    /// Field presence (`true`) or absence (`false`).
    Exists(bool),
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Self::Exists(expected), field) => field.is_some() == *expected,
            (Self::Ne(expected), None) => !expected.is_null(),
            (Self::Ne(expected), Some(actual)) => !json_eq(actual, expected),
            (_, None) => false,
            (Self::Eq(expected), Some(actual)) => json_eq(actual, expected),
            (Self::Gt(bound), Some(actual)) => compare(actual, bound) == Some(Ordering::Greater),
            (Self::Gte(bound), Some(actual)) => matches!(
                compare(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (Self::Lt(bound), Some(actual)) => compare(actual, bound) == Some(Ordering::Less),
            (Self::Lte(bound), Some(actual)) => matches!(
                compare(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (Self::In(options), Some(actual)) => options.iter().any(|o| json_eq(actual, o)),
            (Self::Contains(needle), Some(Value::String(haystack))) => match needle {
                Value::String(n) => haystack.contains(n.as_str()),
                _ => false,
            },
            (Self::Contains(needle), Some(Value::Array(items))) => {
                items.iter().any(|item| json_eq(item, needle))
            }
            (Self::Contains(_), Some(_)) => false,
        }
    }
}

/// One field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Dotted field path.
    pub field: String,
    /// Test applied to the field's value.
    pub condition: Condition,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first; documents missing the field go last.
    #[default]
    Ascending,
    /// Largest first; documents missing the field go last.
    Descending,
}

/// A filter over the documents of one collection.
///
/// # Example
///
/// ```rust
/// use docvault_core::{Query, SortOrder};
///
/// let query = Query::new()
///     .where_eq("status", "published")
///     .gte("views", 100)
///     .sort_by("views", SortOrder::Descending)
///     .limit(10);
/// assert_eq!(query.predicates().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    predicates: Vec<Predicate>,
    sort: Option<(String, SortOrder)>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// A query matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for [`Query::new`].
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a predicate.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.predicates.push(Predicate {
            field: field.into(),
            condition,
        });
        self
    }

    /// `field == value`.
    #[must_use]
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Eq(value.into()))
    }

    /// `field != value`.
    #[must_use]
    pub fn where_ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Ne(value.into()))
    }

    /// `field > value`.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Gt(value.into()))
    }

    /// `field >= value`.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Gte(value.into()))
    }

    /// `field < value`.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Lt(value.into()))
    }

    /// `field <= value`.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Lte(value.into()))
    }

    /// `field` equals any of `values`.
    #[must_use]
    pub fn any_of<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(field, Condition::In(values))
    }

    /// `field` contains `value` (substring or array element).
    #[must_use]
    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Contains(value.into()))
    }

    /// `field` is present.
    #[must_use]
    pub fn exists(self, field: impl Into<String>) -> Self {
        self.filter(field, Condition::Exists(true))
    }

    /// `field` is absent.
    #[must_use]
    pub fn missing(self, field: impl Into<String>) -> Self {
        self.filter(field, Condition::Exists(false))
    }

    /// Orders results by `field`.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    /// Skips the first `n` results (after sorting).
    #[must_use]
    pub const fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    /// Returns at most `n` results.
    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// The predicates, in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Number of matches after which later documents cannot change the
    /// result, in scan order. `None` when every match is needed.
    #[must_use]
    pub fn match_budget(&self) -> Option<usize> {
        match (&self.sort, self.limit) {
            (None, Some(limit)) => Some(self.offset.saturating_add(limit)),
            _ => None,
        }
    }

    /// Returns true if `doc` satisfies every predicate.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates
            .iter()
            .all(|p| p.condition.matches(doc.get_path(&p.field)))
    }

    /// Filters, sorts and pages `docs`.
    ///
    /// Input order is preserved among documents that compare equal.
    #[must_use]
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        self.arrange(docs.into_iter().filter(|d| self.matches(d)).collect())
    }

    /// Sorts and pages documents that already match.
    #[must_use]
    pub fn arrange(&self, mut selected: Vec<Document>) -> Vec<Document> {
        if let Some((field, order)) = &self.sort {
            selected.sort_by(|a, b| {
                match (a.get_path(field), b.get_path(field)) {
                    (Some(x), Some(y)) => {
                        let ord = total_order(x, y);
                        match order {
                            SortOrder::Ascending => ord,
                            SortOrder::Descending => ord.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(self.offset).take(limit).collect()
    }
}

/// JSON equality with numeric normalization.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders two scalars of the same JSON type.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Sort order over all values: by type rank, then by value.
fn total_order(a: &Value, b: &Value) -> Ordering {
    compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn post(id: &str, views: i64, status: &str) -> Document {
        Document::new(id)
            .with("views", views)
            .with("status", status)
            .with("tags", json!(["rust", status]))
    }

    fn posts() -> Vec<Document> {
        vec![
            post("p1", 10, "draft"),
            post("p2", 250, "published"),
            post("p3", 120, "published"),
            post("p4", 5, "archived"),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(Document::id).collect()
    }

    #[test]
    fn empty_query_matches_everything() {
        let result = Query::all().apply(posts());
        assert_eq!(ids(&result), vec!["p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn equality_and_inequality() {
        let result = Query::new().where_eq("status", "published").apply(posts());
        assert_eq!(ids(&result), vec!["p2", "p3"]);

        let result = Query::new().where_ne("status", "published").apply(posts());
        assert_eq!(ids(&result), vec!["p1", "p4"]);

        // Missing fields are "not equal" to a non-null value.
        let result = Query::new().where_ne("author", "ann").apply(posts());
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        let doc = Document::new("n").with("score", json!(1.0));
        assert!(Query::new().where_eq("score", 1).matches(&doc));
        assert!(Query::new().any_of("score", [2, 1]).matches(&doc));
    }

    #[test]
    fn ordering_predicates() {
        let result = Query::new().gt("views", 100).apply(posts());
        assert_eq!(ids(&result), vec!["p2", "p3"]);

        let result = Query::new().gte("views", 10).lt("views", 200).apply(posts());
        assert_eq!(ids(&result), vec!["p1", "p3"]);

        let result = Query::new().lte("views", 5).apply(posts());
        assert_eq!(ids(&result), vec!["p4"]);

        // Comparing across types never matches.
        assert!(Query::new().gt("views", "a").apply(posts()).is_empty());
    }

    #[test]
    fn membership_contains_and_existence() {
        let result = Query::new()
            .any_of("status", ["draft", "archived"])
            .apply(posts());
        assert_eq!(ids(&result), vec!["p1", "p4"]);

        let result = Query::new().contains("status", "lish").apply(posts());
        assert_eq!(ids(&result), vec!["p2", "p3"]);

        let result = Query::new().contains("tags", "draft").apply(posts());
        assert_eq!(ids(&result), vec!["p1"]);

        let mut docs = posts();
        docs.push(Document::new("p5").with("pinned", true));
        assert_eq!(ids(&Query::new().exists("pinned").apply(docs.clone())), vec!["p5"]);
        assert_eq!(Query::new().missing("pinned").apply(docs).len(), 4);
    }

    #[test]
    fn nested_paths() {
        let doc = Document::new("a").with("author", json!({"name": "ann", "age": 31}));
        assert!(Query::new().where_eq("author.name", "ann").matches(&doc));
        assert!(Query::new().gt("author.age", 30).matches(&doc));
        assert!(!Query::new().exists("author.email").matches(&doc));
    }

    #[test]
    fn sort_offset_limit() {
        let result = Query::new()
            .sort_by("views", SortOrder::Descending)
            .apply(posts());
        assert_eq!(ids(&result), vec!["p2", "p3", "p1", "p4"]);

        let result = Query::new()
            .sort_by("views", SortOrder::Ascending)
            .offset(1)
            .limit(2)
            .apply(posts());
        assert_eq!(ids(&result), vec!["p1", "p3"]);

        let result = Query::new().offset(10).apply(posts());
        assert!(result.is_empty());
    }

    #[test]
    fn missing_sort_field_goes_last() {
        let mut docs = posts();
        docs.insert(0, Document::new("p0"));
        for order in [SortOrder::Ascending, SortOrder::Descending] {
            let result = Query::new().sort_by("views", order).apply(docs.clone());
            assert_eq!(result.last().map(Document::id), Some("p0"));
        }
    }

    #[test]
    fn mixed_type_sort_is_total() {
        let docs = vec![
            Document::new("s").with("v", "text"),
            Document::new("n").with("v", 3),
            Document::new("b").with("v", true),
            Document::new("z").with("v", Value::Null),
        ];
        let result = Query::new().sort_by("v", SortOrder::Ascending).apply(docs);
        assert_eq!(ids(&result), vec!["z", "b", "n", "s"]);
    }

    #[test]
    fn match_budget_only_without_sort() {
        assert_eq!(Query::new().match_budget(), None);
        assert_eq!(Query::new().offset(2).limit(3).match_budget(), Some(5));
        assert_eq!(
            Query::new().sort_by("v", SortOrder::Ascending).limit(3).match_budget(),
            None
        );
        assert_eq!(Query::new().offset(1).limit(usize::MAX).match_budget(), Some(usize::MAX));
    }

    fn field_value() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            Just(None),
            Just(Some(Value::Null)),
            any::<bool>().prop_map(|b| Some(json!(b))),
            any::<i32>().prop_map(|n| Some(json!(n))),
            (-1.0e6..1.0e6f64).prop_map(|f| Some(json!(f))),
            "[a-z]{0,4}".prop_map(|s| Some(json!(s))),
        ]
    }

    fn docs_with_field() -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec(field_value(), 0..24).prop_map(|values| {
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let doc = Document::new(format!("d{i:02}"));
                    match v {
                        Some(v) => doc.with("v", v),
                        None => doc,
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn sorted_output_is_ordered(docs in docs_with_field(), descending in any::<bool>()) {
            let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
            let result = Query::new().sort_by("v", order).apply(docs.clone());
            prop_assert_eq!(result.len(), docs.len());

            for pair in result.windows(2) {
                match (pair[0].get("v"), pair[1].get("v")) {
                    (Some(a), Some(b)) => {
                        let ord = total_order(a, b);
                        let ord = if descending { ord.reverse() } else { ord };
                        prop_assert_ne!(ord, Ordering::Greater);
                    }
                    (None, Some(_)) => prop_assert!(false, "missing field sorted before a present one"),
                    _ => {}
                }
            }
        }

        #[test]
        fn budgeted_prefix_gives_same_page(
            docs in docs_with_field(),
            offset in 0usize..6,
            limit in 0usize..6,
        ) {
            let query = Query::new().exists("v").offset(offset).limit(limit);
            let budget = query.match_budget().unwrap();
            let prefix: Vec<Document> = docs
                .iter()
                .filter(|d| query.matches(d))
                .take(budget)
                .cloned()
                .collect();
            prop_assert_eq!(query.arrange(prefix), query.apply(docs));
        }
    }
}
