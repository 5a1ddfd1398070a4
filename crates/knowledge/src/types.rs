//! Knowledge base type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Embedding vector. Length equals the namespace's dimension.
pub type Embedding = Vec<f32>;

/// Document metadata: string keys to scalar values.
///
/// A `BTreeMap` keeps serialized output stable across runs.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known metadata keys.
pub mod keys {
    /// Where the text came from ("blog", "twitter", ...)
    pub const SOURCE: &str = "source";
    /// Canonical URL of the source, if any
    pub const URL: &str = "url";
    /// Human-readable title
    pub const TITLE: &str = "title";
    /// Reserved: the remote backend stores the document text under this key.
    pub const CONTENT: &str = "content";
}

/// Value substituted for a missing `source` key.
pub const DEFAULT_SOURCE: &str = "unknown";

/// A scalar metadata value.
///
/// Nested objects, arrays and nulls are not representable; they are rejected
/// when the request is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Exact-match comparison used by metadata filters.
    ///
    /// Numbers compare by value, so `3` matches `3.0`.
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Fill in the documented defaults for the well-known keys.
///
/// - `source` defaults to [`DEFAULT_SOURCE`]
/// - `url` and `title` default to the empty string
///
/// Keys already present are left untouched.
pub fn apply_default_metadata(metadata: &mut Metadata) {
    metadata
        .entry(keys::SOURCE.to_string())
        .or_insert_with(|| DEFAULT_SOURCE.into());
    metadata
        .entry(keys::URL.to_string())
        .or_insert_with(|| "".into());
    metadata
        .entry(keys::TITLE.to_string())
        .or_insert_with(|| "".into());
}

/// Exact-match conjunction over metadata keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub Metadata);

impl MetadataFilter {
    /// Whether the filter constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every filter key is present in `metadata` with a matching value.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .map(|actual| actual.matches(expected))
                .unwrap_or(false)
        })
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for MetadataFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MetadataFilter(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A unit of ingested knowledge before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Caller-supplied id; generated by the store when absent
    pub id: Option<String>,

    /// Raw text to embed
    pub text: String,

    /// Arbitrary scalar metadata
    pub metadata: Metadata,
}

impl Document {
    /// Create a document without an id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Set the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the embedding computed for this document's text.
    pub fn into_record(self, values: Embedding) -> VectorRecord {
        VectorRecord {
            id: self.id,
            text: self.text,
            metadata: self.metadata,
            values,
        }
    }
}

/// A document together with its embedding, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Metadata,
    pub values: Embedding,
}

/// Outcome of a store upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResult {
    /// Number of records written
    pub stored: usize,

    /// Final id of each record, in input order
    pub ids: Vec<String>,

    /// Documents in the namespace after the write
    pub total: usize,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// `1 - distance`
    pub similarity: f32,
    /// Cosine distance
    pub distance: f32,
}

/// Ranked matches for one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Descending by similarity, at most top-k long
    pub matches: Vec<QueryMatch>,

    /// True when the namespace holds no documents at all
    pub namespace_empty: bool,
}

impl QueryResult {
    /// Result for a namespace with no documents.
    pub fn empty_namespace() -> Self {
        Self {
            matches: Vec::new(),
            namespace_empty: true,
        }
    }
}

/// Store statistics for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of documents
    pub count: usize,

    /// Established vector dimension; `None` for a local namespace that was never written
    pub dimension: Option<usize>,

    /// Namespace / collection name
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_value_untagged_parsing() {
        let parsed: Metadata =
            serde_json::from_str(r#"{"a": "x", "b": 3, "c": 2.5, "d": true}"#).unwrap();
        assert_eq!(parsed["a"], MetadataValue::String("x".into()));
        assert_eq!(parsed["b"], MetadataValue::Integer(3));
        assert_eq!(parsed["c"], MetadataValue::Float(2.5));
        assert_eq!(parsed["d"], MetadataValue::Bool(true));
    }

    #[test]
    fn test_metadata_rejects_nested_values() {
        assert!(serde_json::from_str::<Metadata>(r#"{"a": {"b": 1}}"#).is_err());
        assert!(serde_json::from_str::<Metadata>(r#"{"a": [1, 2]}"#).is_err());
        assert!(serde_json::from_str::<Metadata>(r#"{"a": null}"#).is_err());
    }

    #[test]
    fn test_numeric_match_across_types() {
        assert!(MetadataValue::Integer(3).matches(&MetadataValue::Float(3.0)));
        assert!(!MetadataValue::Integer(3).matches(&MetadataValue::String("3".into())));
    }

    #[test]
    fn test_filter_is_conjunction() {
        let metadata: Metadata = [
            ("source".to_string(), MetadataValue::from("blog")),
            ("lang".to_string(), MetadataValue::from("en")),
        ]
        .into_iter()
        .collect();

        let both: MetadataFilter = [("source", "blog"), ("lang", "en")].into_iter().collect();
        let wrong: MetadataFilter = [("source", "blog"), ("lang", "de")].into_iter().collect();
        let missing: MetadataFilter = [("author", "me")].into_iter().collect();

        assert!(both.matches(&metadata));
        assert!(!wrong.matches(&metadata));
        assert!(!missing.matches(&metadata));
        assert!(MetadataFilter::default().matches(&metadata));
    }

    #[test]
    fn test_default_metadata_keeps_existing_keys() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "blog".into());
        apply_default_metadata(&mut metadata);

        assert_eq!(metadata["source"].as_str(), Some("blog"));
        assert_eq!(metadata["url"].as_str(), Some(""));
        assert_eq!(metadata["title"].as_str(), Some(""));

        let mut empty = Metadata::new();
        apply_default_metadata(&mut empty);
        assert_eq!(empty["source"].as_str(), Some(DEFAULT_SOURCE));
    }
}
