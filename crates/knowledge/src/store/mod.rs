//! Vector store abstraction.
//!
//! Both backends honor one contract:
//! - cosine similarity, with `similarity = 1 - distance`
//! - results descending by similarity, ties in insertion order
//! - metadata filters applied before top-k selection
//! - upsert replaces by id, delete and clear are idempotent
//! - an empty namespace answers queries with an empty result, not an error

pub mod local;
pub mod remote;

pub use local::LocalVectorStore;
pub use remote::RemoteVectorStore;

use crate::config::{KnowledgeConfig, StoreBackend};
use crate::types::{
    keys, MetadataFilter, QueryMatch, QueryResult, StoreStats, UpsertResult, VectorRecord,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use vectorkb_core::{AppError, AppResult};

/// Storage and similarity search for one namespace.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    /// Backend identifier ("local", "remote")
    fn backend_name(&self) -> &'static str;

    /// Namespace (collection) this store reads and writes
    fn namespace(&self) -> &str;

    /// Insert or replace records by id. Missing ids are generated.
    ///
    /// The whole batch is validated before anything is written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> AppResult<UpsertResult>;

    /// Rank stored documents against `vector`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<QueryResult>;

    /// Remove documents by id, returning how many existed.
    async fn delete(&self, ids: &[String]) -> AppResult<usize>;

    /// Remove every document in the namespace.
    async fn clear(&self) -> AppResult<()>;

    async fn stats(&self) -> AppResult<StoreStats>;
}

/// Open the configured backend.
///
/// The remote index is created on first use with `dimension` and the
/// configured metric; an existing index of another dimension is rejected.
pub async fn open_store(
    config: &KnowledgeConfig,
    workspace: &Path,
    dimension: usize,
) -> AppResult<Arc<dyn VectorStore>> {
    match config.backend {
        StoreBackend::Local => {
            let dir = config.local_index_dir(workspace);
            let store = LocalVectorStore::open(&dir, &config.local.collection)?;
            Ok(Arc::new(store))
        }
        StoreBackend::Remote => {
            let store = RemoteVectorStore::from_config(&config.remote)?;
            store
                .initialize_index(dimension, &config.remote.metric)
                .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Vectors of different length or with zero norm score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance for a similarity score.
pub fn distance_from_similarity(similarity: f32) -> f32 {
    1.0 - similarity
}

/// Similarity score for a cosine distance.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Sort descending by similarity and keep the first `top_k`.
///
/// The sort is stable, so candidates given in insertion order keep that
/// order among equal scores.
pub(crate) fn rank(mut matches: Vec<QueryMatch>, top_k: usize) -> Vec<QueryMatch> {
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches.truncate(top_k);
    matches
}

/// Generated id for position `index` of a batch written when the namespace
/// held `count` documents. `attempt > 0` adds a disambiguating suffix.
pub(crate) fn candidate_id(count: usize, index: usize, attempt: usize) -> String {
    if attempt == 0 {
        format!("doc_{}_{}", count, index)
    } else {
        format!("doc_{}_{}_{}", count, index, attempt)
    }
}

/// Final id for every record, in input order.
///
/// Caller-supplied ids are kept. Generated ids avoid `taken`, every
/// caller-supplied id in the batch, and each other.
pub(crate) fn assign_ids(
    records: &[VectorRecord],
    count: usize,
    taken: &HashSet<String>,
) -> Vec<String> {
    let mut used: HashSet<String> = taken.clone();
    used.extend(records.iter().filter_map(|r| r.id.clone()));

    records
        .iter()
        .enumerate()
        .map(|(index, record)| match &record.id {
            Some(id) => id.clone(),
            None => {
                let mut attempt = 0;
                loop {
                    let candidate = candidate_id(count, index, attempt);
                    if used.insert(candidate.clone()) {
                        break candidate;
                    }
                    attempt += 1;
                }
            }
        })
        .collect()
}

/// Check a batch before any write.
///
/// Returns the batch dimension (`None` for an empty batch).
pub(crate) fn validate_batch(
    records: &[VectorRecord],
    established: Option<usize>,
) -> AppResult<Option<usize>> {
    let mut seen = HashSet::new();
    let mut batch_dimension = established;

    for (index, record) in records.iter().enumerate() {
        if let Some(id) = &record.id {
            if id.trim().is_empty() {
                return Err(AppError::Input(format!("Empty id at index {}", index)));
            }
            if !seen.insert(id.as_str()) {
                return Err(AppError::Input(format!("Duplicate id in batch: {}", id)));
            }
        }

        if record.metadata.contains_key(keys::CONTENT) {
            return Err(AppError::Input(format!(
                "Metadata key '{}' is reserved (index {})",
                keys::CONTENT,
                index
            )));
        }

        if record.values.is_empty() {
            return Err(AppError::Input(format!("Empty vector at index {}", index)));
        }

        if record.values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Input(format!(
                "Vector at index {} contains non-finite values",
                index
            )));
        }

        match batch_dimension {
            Some(expected) if expected != record.values.len() => {
                return Err(AppError::DimensionMismatch {
                    expected,
                    actual: record.values.len(),
                });
            }
            Some(_) => {}
            None => batch_dimension = Some(record.values.len()),
        }
    }

    Ok(if records.is_empty() { None } else { batch_dimension })
}
