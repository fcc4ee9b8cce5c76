//! Query, sort, and index types shared by the bundled stores.

use super::{Document, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A single predicate on a top-level document field.
///
/// Missing fields read as null.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Condition {
    fn matches(&self, document: &Document) -> bool {
        match self {
            Condition::Eq(field, expected) => document.get(field) == Some(expected),
            Condition::IsNull(field) => document.get(field).map_or(true, Value::is_null),
            Condition::NotNull(field) => document.get(field).is_some_and(|v| !v.is_null()),
        }
    }
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn is_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::IsNull(field.into()));
        self
    }

    pub fn not_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotNull(field.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order: SortOrder::Ascending,
        });
        self
    }

    pub fn sort_by_descending(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order: SortOrder::Descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Single-field index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub field: String,
    pub order: SortOrder,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            order,
        }
    }
}

/// Order values of mixed JSON types: null < bool < number < string < array < object.
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

pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Contents of one collection: documents in natural (insertion) order plus
/// the indexes declared on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl Documents {
    pub fn insert(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// Ascending sorts are stable. Descending sorts return later-inserted
    /// documents first among equal keys.
    pub fn find(&self, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let mut found: Vec<&Document> = self
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .collect();

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let a = a.get(&sort.field).unwrap_or(&Value::Null);
                let b = b.get(&sort.field).unwrap_or(&Value::Null);
                compare_values(a, b)
            });
            if sort.order == SortOrder::Descending {
                found.reverse();
            }
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        found.into_iter().take(limit).cloned().collect()
    }

    pub fn count(&self, filter: &Filter) -> u64 {
        self.documents.iter().filter(|d| filter.matches(d)).count() as u64
    }

    pub fn update_one(&mut self, filter: &Filter, fields: Document) -> u64 {
        match self.documents.iter_mut().find(|d| filter.matches(d)) {
            Some(document) => {
                document.extend(fields);
                1
            }
            None => 0,
        }
    }

    /// Indexes are checked by name. Re-declaring a name with a different
    /// definition is a conflict.
    pub fn create_index_if_absent(
        &mut self,
        collection: &str,
        index: IndexSpec,
    ) -> Result<bool, StoreError> {
        match self.indexes.iter().find(|i| i.name == index.name) {
            Some(existing) if *existing == index => Ok(false),
            Some(existing) => Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                reason: format!(
                    "index '{}' already exists on field '{}'",
                    existing.name, existing.field
                ),
            }),
            None => {
                self.indexes.push(index);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn sample() -> Documents {
        let mut docs = Documents::default();
        docs.insert(doc(json!({"id": "a", "db": "main", "at": 3})));
        docs.insert(doc(json!({"id": "b", "db": "main", "at": null})));
        docs.insert(doc(json!({"id": "c", "db": "other", "at": 1})));
        docs.insert(doc(json!({"id": "d", "db": "main", "at": 3})));
        docs.insert(doc(json!({"id": "e", "db": "main"})));
        docs
    }

    fn ids(found: &[Document]) -> Vec<&str> {
        found.iter().map(|d| d["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_filter_eq_and_null() {
        let docs = sample();
        let found = docs.find(&Filter::new().eq("db", "main").is_null("at"), &FindOptions::new());
        assert_eq!(ids(&found), vec!["b", "e"]);

        let found = docs.find(&Filter::new().eq("db", "main").not_null("at"), &FindOptions::new());
        assert_eq!(ids(&found), vec!["a", "d"]);
    }

    #[test]
    fn test_sort_tie_breaks_by_natural_order() {
        let docs = sample();
        let filter = Filter::new().not_null("at");

        let asc = docs.find(&filter, &FindOptions::new().sort_by("at"));
        assert_eq!(ids(&asc), vec!["c", "a", "d"]);

        let desc = docs.find(&filter, &FindOptions::new().sort_by_descending("at").limit(1));
        assert_eq!(ids(&desc), vec!["d"]);
    }

    #[test]
    fn test_update_one_only_first_match() {
        let mut docs = sample();
        let mut fields = Document::new();
        fields.insert("at".into(), json!(9));

        assert_eq!(docs.update_one(&Filter::new().eq("db", "main"), fields.clone()), 1);
        assert_eq!(docs.documents[0]["at"], json!(9));
        assert_eq!(docs.documents[3]["at"], json!(3));

        assert_eq!(docs.update_one(&Filter::new().eq("db", "missing"), fields), 0);
    }

    #[test]
    fn test_create_index_if_absent() {
        let mut docs = Documents::default();
        let index = IndexSpec::new("ByAt", "at", SortOrder::Descending);

        assert!(docs.create_index_if_absent("c", index.clone()).unwrap());
        assert!(!docs.create_index_if_absent("c", index).unwrap());

        let conflicting = IndexSpec::new("ByAt", "other", SortOrder::Ascending);
        assert!(docs.create_index_if_absent("c", conflicting).is_err());
        assert_eq!(docs.indexes.len(), 1);
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
