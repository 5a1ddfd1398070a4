//! Request and response shapes of the JSON command surface.
//!
//! These are the stable wire formats; they do not change with the backend.

use crate::types::{keys, Document, Metadata, MetadataFilter, QueryMatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vectorkb_core::{AppError, AppResult};

/// Message returned instead of results when the namespace holds no documents.
pub const EMPTY_KNOWLEDGE_BASE_MESSAGE: &str =
    "Knowledge base is empty. Please embed documents first.";

/// Parse a request body; malformed JSON is an input error.
pub fn parse_request<T: DeserializeOwned>(input: &str) -> AppResult<T> {
    serde_json::from_str(input).map_err(|e| AppError::Input(format!("Invalid JSON input: {}", e)))
}

/// `search` input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Defaults to the configured top_k
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            filter: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One ranked document in a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub similarity: f32,
    pub distance: f32,
    pub metadata: Metadata,
}

impl From<QueryMatch> for SearchHit {
    fn from(m: QueryMatch) -> Self {
        Self {
            content: m.content,
            similarity: m.similarity,
            distance: m.distance,
            metadata: m.metadata,
        }
    }
}

/// `search` output.
///
/// For an empty knowledge base `results_count` is omitted and `message` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_count: Option<usize>,

    pub results: Vec<SearchHit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchResponse {
    pub fn empty_knowledge_base(query: String) -> Self {
        Self {
            query,
            results_count: None,
            results: Vec::new(),
            message: Some(EMPTY_KNOWLEDGE_BASE_MESSAGE.to_string()),
        }
    }

    pub fn with_results(query: String, results: Vec<SearchHit>) -> Self {
        Self {
            query,
            results_count: Some(results.len()),
            results,
            message: None,
        }
    }
}

/// One document in an `embed` request.
///
/// `source`, `url` and `title` are shorthands for metadata keys and win over
/// the same keys inside `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedItem {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl From<EmbedItem> for Document {
    fn from(item: EmbedItem) -> Self {
        let mut metadata = item.metadata;
        for (key, value) in [
            (keys::SOURCE, item.source),
            (keys::URL, item.url),
            (keys::TITLE, item.title),
        ] {
            if let Some(value) = value {
                metadata.insert(key.to_string(), value.into());
            }
        }

        Document {
            id: item.id,
            text: item.text,
            metadata,
        }
    }
}

/// `embed` input: a single document or an array of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedRequest {
    One(EmbedItem),
    Many(Vec<EmbedItem>),
}

impl EmbedRequest {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            EmbedRequest::One(item) => vec![item.into()],
            EmbedRequest::Many(items) => items.into_iter().map(Document::from).collect(),
        }
    }
}

/// `embed` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub status: String,
    pub stored: usize,
    pub total_in_collection: usize,
    pub ids: Vec<String>,
}

/// `stats` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_documents: usize,
    pub collection_name: String,
    pub model: String,
    pub embedding_dimension: usize,
}

/// `clear` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
    pub collection_cleared: bool,
}

impl ClearResponse {
    pub fn deleted() -> Self {
        Self {
            status: "deleted".to_string(),
            collection_cleared: true,
        }
    }
}

/// Error output, printed to stdout with a non-zero exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataValue;
    use serde_json::json;

    #[test]
    fn test_embed_request_single_or_array() {
        let one: EmbedRequest =
            parse_request(r#"{"text": "AI is great", "source": "blog"}"#).unwrap();
        assert_eq!(one.into_documents().len(), 1);

        let many: EmbedRequest =
            parse_request(r#"[{"text": "a"}, {"text": "b", "id": "b1"}]"#).unwrap();
        let docs = many.into_documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id.as_deref(), Some("b1"));
    }

    #[test]
    fn test_embed_item_shorthands_override_metadata() {
        let item: EmbedItem = serde_json::from_value(json!({
            "text": "t",
            "source": "blog",
            "metadata": {"source": "rss", "lang": "en", "views": 10}
        }))
        .unwrap();

        let doc = Document::from(item);
        assert_eq!(doc.metadata["source"].as_str(), Some("blog"));
        assert_eq!(doc.metadata["lang"].as_str(), Some("en"));
        assert_eq!(doc.metadata["views"], MetadataValue::Integer(10));
        assert!(!doc.metadata.contains_key("url"));
    }

    #[test]
    fn test_missing_text_is_input_error() {
        let result = parse_request::<EmbedRequest>(r#"{"source": "blog"}"#);
        assert!(matches!(result, Err(AppError::Input(_))));

        let result = parse_request::<SearchRequest>("not json");
        assert!(matches!(result, Err(AppError::Input(_))));
    }

    #[test]
    fn test_search_request_defaults() {
        let request: SearchRequest = parse_request(r#"{"query": "rust"}"#).unwrap();
        assert_eq!(request, SearchRequest::new("rust"));

        let request: SearchRequest =
            parse_request(r#"{"query": "rust", "top_k": 2, "filter": {"source": "blog"}}"#)
                .unwrap();
        assert_eq!(request.top_k, Some(2));
        assert!(request.filter.is_some());
    }

    #[test]
    fn test_search_response_shapes() {
        let empty = serde_json::to_value(SearchResponse::empty_knowledge_base("q".into())).unwrap();
        assert_eq!(
            empty,
            json!({"query": "q", "results": [], "message": EMPTY_KNOWLEDGE_BASE_MESSAGE})
        );

        let hit = SearchHit {
            content: "c".into(),
            similarity: 0.5,
            distance: 0.5,
            metadata: Metadata::new(),
        };
        let full =
            serde_json::to_value(SearchResponse::with_results("q".into(), vec![hit])).unwrap();
        assert_eq!(full["results_count"], 1);
        assert!(full.get("message").is_none());
    }

    #[test]
    fn test_error_response() {
        let err = AppError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.kind, "dimension_mismatch");
        assert!(response.error.contains("384"));
    }
}
