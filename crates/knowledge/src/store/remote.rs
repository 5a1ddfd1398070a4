//! Remote vector store over a Pinecone-style HTTP API.
//!
//! Ranking happens on the service; this client translates the wire format
//! into the shared result types. Document text travels in the reserved
//! `content` metadata key and is stripped from returned metadata.
//!
//! Transport failures, 5xx and 429 are retried with exponential backoff.
//! Upserts are therefore at-least-once: a request that timed out on our side
//! may still have been applied.

use super::{
    assign_ids, distance_from_similarity, rank, similarity_from_distance, validate_batch,
    VectorStore,
};
use crate::config::RemoteStoreConfig;
use crate::types::{
    keys, Metadata, MetadataFilter, MetadataValue, QueryMatch, QueryResult, StoreStats,
    UpsertResult, VectorRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use vectorkb_core::{AppError, AppResult};

/// Initial backoff between retries
const INITIAL_BACKOFF_MS: u64 = 100;

/// Largest doubling applied to the backoff
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Id-probing rounds before giving up on generated ids
const MAX_ID_ROUNDS: usize = 16;

/// Client for one namespace of a remote index.
pub struct RemoteVectorStore {
    client: Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    namespace: String,
    cloud: String,
    region: String,
    max_retries: u32,
    max_batch: usize,
    backoff: Duration,
    dimension: OnceLock<usize>,
}

impl std::fmt::Debug for RemoteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteVectorStore")
            .field("endpoint", &self.endpoint)
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("dimension", &self.dimension.get())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    distance: Option<f32>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: usize,
}

impl RemoteVectorStore {
    /// Build a client from settings, reading the API key from the environment.
    pub fn from_config(config: &RemoteStoreConfig) -> AppResult<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(config, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn new(config: &RemoteStoreConfig, api_key: impl Into<String>) -> AppResult<Self> {
        if config.namespace.trim().is_empty() {
            return Err(AppError::Config(
                "Remote store requires an explicit namespace".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::BackendUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            index_name: config.index_name.clone(),
            namespace: config.namespace.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            max_retries: config.max_retries,
            max_batch: config.max_batch,
            backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            dimension: OnceLock::new(),
        })
    }

    /// Override the initial retry backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Dimension of the index, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Make sure the index exists with `dimension`.
    ///
    /// Creates the index when absent; "already exists" counts as success.
    /// An existing index of another dimension is a `DimensionMismatch`.
    #[instrument(skip(self), fields(index = %self.index_name))]
    pub async fn initialize_index(&self, dimension: usize, metric: &str) -> AppResult<()> {
        if let Some(existing) = self.describe_index().await? {
            return self.accept_dimension(existing, dimension);
        }

        let body = json!({
            "name": self.index_name,
            "dimension": dimension,
            "metric": metric,
            "spec": {"serverless": {"cloud": self.cloud, "region": self.region}},
        });

        let (status, text) = self
            .request(Method::POST, "/indexes", &[], Some(&body))
            .await?;

        match status {
            s if s.is_success() => {
                info!(
                    "Created remote index '{}' ({} dims, {})",
                    self.index_name, dimension, metric
                );
                self.accept_dimension(dimension, dimension)
            }
            StatusCode::CONFLICT => {
                debug!("Index '{}' created concurrently", self.index_name);
                match self.describe_index().await? {
                    Some(existing) => self.accept_dimension(existing, dimension),
                    None => self.accept_dimension(dimension, dimension),
                }
            }
            _ => Err(http_error("create index", status, &text)),
        }
    }

    fn accept_dimension(&self, existing: usize, requested: usize) -> AppResult<()> {
        if existing != requested {
            return Err(AppError::DimensionMismatch {
                expected: existing,
                actual: requested,
            });
        }
        let _ = self.dimension.set(existing);
        Ok(())
    }

    async fn describe_index(&self) -> AppResult<Option<usize>> {
        let path = format!("/indexes/{}", self.index_name);
        let (status, text) = self.request(Method::GET, &path, &[], None).await?;

        match status {
            s if s.is_success() => {
                let description: IndexDescription = parse("describe index", &text)?;
                Ok(Some(description.dimension))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(http_error("describe index", status, &text)),
        }
    }

    /// Send a request, retrying transport failures, 429 and 5xx.
    ///
    /// Returns the final status and body; interpreting other statuses is up
    /// to the caller.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> AppResult<(StatusCode, String)> {
        let url = format!("{}{}", self.endpoint, path);
        let mut attempt: u32 = 0;

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header("Api-Key", &self.api_key)
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let outcome = match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        let text = response.text().await.unwrap_or_default();
                        Err(http_error(path, status, &text))
                    } else {
                        let text = response.text().await.map_err(|e| {
                            AppError::BackendUnavailable(format!("Failed to read response: {}", e))
                        })?;
                        Ok((status, text))
                    }
                }
                Err(e) => Err(AppError::BackendUnavailable(format!(
                    "Request to {} failed: {}",
                    path, e
                ))),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = backoff_delay(self.backoff, attempt);
                    warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e,
                        attempt,
                        self.max_retries + 1,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ids among `ids` that exist in the namespace.
    async fn fetch_existing(&self, ids: &[String]) -> AppResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query = vec![("namespace", self.namespace.clone())];
        query.extend(ids.iter().map(|id| ("ids", id.clone())));

        let (status, text) = self
            .request(Method::GET, "/vectors/fetch", &query, None)
            .await?;

        match status {
            s if s.is_success() => {
                let fetched: FetchResponse = parse("fetch", &text)?;
                Ok(fetched.vectors.into_keys().collect())
            }
            StatusCode::NOT_FOUND => Ok(HashSet::new()),
            _ => Err(http_error("fetch", status, &text)),
        }
    }

    /// Pick generated ids that do not collide with anything stored.
    async fn resolve_ids(&self, records: &[VectorRecord]) -> AppResult<Vec<String>> {
        if records.iter().all(|r| r.id.is_some()) {
            return Ok(assign_ids(records, 0, &HashSet::new()));
        }

        let count = self.stats().await?.count;
        let mut taken = HashSet::new();

        for _ in 0..MAX_ID_ROUNDS {
            let ids = assign_ids(records, count, &taken);
            let generated: Vec<String> = ids
                .iter()
                .zip(records)
                .filter(|(_, r)| r.id.is_none())
                .map(|(id, _)| id.clone())
                .collect();

            let collisions = self.fetch_existing(&generated).await?;
            if collisions.is_empty() {
                return Ok(ids);
            }
            debug!("{} generated ids already taken, retrying", collisions.len());
            taken.extend(collisions);
        }

        Err(AppError::BackendUnavailable(
            "Could not find free document ids".to_string(),
        ))
    }
}

/// Delay before retry `attempt` (1-based), doubling from `base`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1 << exponent)
}

/// Translate a wire match, splitting the document text out of the metadata.
fn to_match(wire: WireMatch) -> QueryMatch {
    let (similarity, distance) = match (wire.score, wire.distance) {
        (Some(score), Some(distance)) => (score, distance),
        (Some(score), None) => (score, distance_from_similarity(score)),
        (None, Some(distance)) => (similarity_from_distance(distance), distance),
        (None, None) => (0.0, 1.0),
    };

    let mut raw = wire.metadata.unwrap_or_default();
    let content = match raw.remove(keys::CONTENT) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };

    let mut metadata = Metadata::new();
    for (key, value) in raw {
        match serde_json::from_value::<MetadataValue>(value) {
            Ok(value) => {
                metadata.insert(key, value);
            }
            Err(_) => debug!("Skipping non-scalar metadata key '{}' on '{}'", key, wire.id),
        }
    }

    QueryMatch {
        id: wire.id,
        content,
        metadata,
        similarity,
        distance,
    }
}

fn http_error(context: &str, status: StatusCode, body: &str) -> AppError {
    let snippet: String = body.chars().take(200).collect();
    AppError::BackendUnavailable(format!("{} returned {}: {}", context, status, snippet))
}

fn parse<T: serde::de::DeserializeOwned>(context: &str, text: &str) -> AppResult<T> {
    serde_json::from_str(text).map_err(|e| {
        AppError::BackendUnavailable(format!("Invalid {} response: {}", context, e))
    })
}

/// Exact-match filter in the service's query language.
fn filter_to_wire(filter: &MetadataFilter) -> Value {
    let clauses: Map<String, Value> = filter
        .0
        .iter()
        .map(|(key, value)| (key.clone(), json!({ "$eq": value })))
        .collect();
    Value::Object(clauses)
}

#[async_trait]
impl VectorStore for RemoteVectorStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip(self, records), fields(batch = records.len(), namespace = %self.namespace))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> AppResult<UpsertResult> {
        if records.len() > self.max_batch {
            return Err(AppError::Input(format!(
                "Batch of {} exceeds the remote limit of {} records",
                records.len(),
                self.max_batch
            )));
        }

        validate_batch(&records, self.dimension())?;

        if records.is_empty() {
            let total = self.stats().await?.count;
            return Ok(UpsertResult {
                stored: 0,
                ids: Vec::new(),
                total,
            });
        }

        let ids = self.resolve_ids(&records).await?;

        let mut vectors = Vec::with_capacity(records.len());
        for (record, id) in records.into_iter().zip(&ids) {
            let mut metadata = match serde_json::to_value(&record.metadata)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            metadata.insert(keys::CONTENT.to_string(), Value::String(record.text));
            vectors.push(json!({"id": id, "values": record.values, "metadata": metadata}));
        }

        let body = json!({"namespace": self.namespace, "vectors": vectors});
        let (status, text) = self
            .request(Method::POST, "/vectors/upsert", &[], Some(&body))
            .await?;
        if !status.is_success() {
            return Err(http_error("upsert", status, &text));
        }

        let total = self.stats().await?.count;
        debug!("Upserted {} vectors (namespace total {})", ids.len(), total);

        Ok(UpsertResult {
            stored: ids.len(),
            ids,
            total,
        })
    }

    #[instrument(skip(self, vector, filter), fields(namespace = %self.namespace))]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<QueryResult> {
        if let Some(expected) = self.dimension() {
            if vector.len() != expected {
                return Err(AppError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut body = json!({
            "namespace": self.namespace,
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = filter_to_wire(filter);
        }

        let (status, text) = self
            .request(Method::POST, "/query", &[], Some(&body))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(QueryResult::empty_namespace());
        }
        if !status.is_success() {
            return Err(http_error("query", status, &text));
        }

        let response: QueryResponse = parse("query", &text)?;
        let mut matches = Vec::with_capacity(response.matches.len());
        for wire in response.matches {
            let matched = to_match(wire);
            if let Some(filter) = filter {
                if !filter.matches(&matched.metadata) {
                    warn!("Dropping match '{}' that violates the filter", matched.id);
                    continue;
                }
            }
            matches.push(matched);
        }

        let namespace_empty = matches.is_empty() && self.stats().await?.count == 0;

        Ok(QueryResult {
            matches: rank(matches, top_k),
            namespace_empty,
        })
    }

    async fn delete(&self, ids: &[String]) -> AppResult<usize> {
        let existing = self.fetch_existing(ids).await?;
        if existing.is_empty() {
            return Ok(0);
        }

        let existing: Vec<String> = ids
            .iter()
            .filter(|id| existing.contains(*id))
            .cloned()
            .collect();
        let body = json!({"namespace": self.namespace, "ids": existing});
        let (status, text) = self
            .request(Method::POST, "/vectors/delete", &[], Some(&body))
            .await?;

        match status {
            s if s.is_success() => Ok(existing.len()),
            StatusCode::NOT_FOUND => Ok(0),
            _ => Err(http_error("delete", status, &text)),
        }
    }

    async fn clear(&self) -> AppResult<()> {
        let body = json!({"namespace": self.namespace, "deleteAll": true});
        let (status, text) = self
            .request(Method::POST, "/vectors/delete", &[], Some(&body))
            .await?;

        match status {
            s if s.is_success() || s == StatusCode::NOT_FOUND => {
                info!("Cleared remote namespace '{}'", self.namespace);
                Ok(())
            }
            _ => Err(http_error("delete all", status, &text)),
        }
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        let (status, text) = self
            .request(Method::POST, "/describe_index_stats", &[], Some(&json!({})))
            .await?;

        let (count, dimension) = match status {
            s if s.is_success() => {
                let stats: IndexStats = parse("describe_index_stats", &text)?;
                let count = stats
                    .namespaces
                    .get(&self.namespace)
                    .map(|ns| ns.vector_count)
                    .unwrap_or(0);
                (count, stats.dimension.or(self.dimension()))
            }
            StatusCode::NOT_FOUND => (0, self.dimension()),
            _ => return Err(http_error("describe_index_stats", status, &text)),
        };

        Ok(StoreStats {
            count,
            dimension,
            namespace: self.namespace.clone(),
        })
    }
}
