//! Knowledge base service: embedding model plus vector store.
//!
//! Four operations, each returning a wire-ready response:
//! [`KnowledgeBase::embed_and_store`], [`KnowledgeBase::search`],
//! [`KnowledgeBase::stats`] and [`KnowledgeBase::clear`].
//! The service validates input, fills metadata defaults and bounds every
//! embedding and store call by the request timeout. It never branches on
//! which backend it talks to.

use crate::api::{
    ClearResponse, EmbedResponse, SearchHit, SearchRequest, SearchResponse, StatsResponse,
};
use crate::config::KnowledgeConfig;
use crate::embeddings::EmbeddingModel;
use crate::store::{open_store, VectorStore};
use crate::types::{apply_default_metadata, keys, Document};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use vectorkb_core::{AppError, AppResult};

/// Tunables applied by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// top_k used when a search request omits it
    pub default_top_k: usize,

    /// Deadline for each embedding or store call
    pub request_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&KnowledgeConfig> for ServiceOptions {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            default_top_k: config.default_top_k,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Retrieval service over one namespace.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    model: Arc<EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    options: ServiceOptions,
}

impl KnowledgeBase {
    pub fn new(
        model: Arc<EmbeddingModel>,
        store: Arc<dyn VectorStore>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            model,
            store,
            options,
        }
    }

    /// Load the embedding model and open the configured store.
    ///
    /// Model loading and index setup are each bounded by the request timeout.
    pub async fn open(workspace: &Path, config: &KnowledgeConfig) -> AppResult<Self> {
        config.validate()?;
        let options = ServiceOptions::from(config);

        let model = within(options.request_timeout, EmbeddingModel::load(&config.embedding)).await?;
        let store = within(
            options.request_timeout,
            open_store(config, workspace, model.dimensions()),
        )
        .await?;

        info!(
            "Knowledge base ready: backend={}, namespace={}, model={}",
            store.backend_name(),
            store.namespace(),
            model.model_name()
        );

        Ok(Self::new(Arc::new(model), store, options))
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed documents and upsert them as one batch.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn embed_and_store(&self, mut documents: Vec<Document>) -> AppResult<EmbedResponse> {
        if documents.is_empty() {
            return Err(AppError::Input("No documents to embed".to_string()));
        }

        for (index, document) in documents.iter_mut().enumerate() {
            if document.text.trim().is_empty() {
                return Err(AppError::Input(format!(
                    "Document at index {} has empty text",
                    index
                )));
            }
            if document.metadata.contains_key(keys::CONTENT) {
                return Err(AppError::Input(format!(
                    "Metadata key '{}' is reserved",
                    keys::CONTENT
                )));
            }
            apply_default_metadata(&mut document.metadata);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.with_deadline(self.model.embed(&texts)).await?;

        let records = documents
            .into_iter()
            .zip(embeddings)
            .map(|(document, values)| document.into_record(values))
            .collect();

        let result = self.with_deadline(self.store.upsert(records)).await?;

        info!(
            "Stored {} documents in '{}' (total {})",
            result.stored,
            self.store.namespace(),
            result.total
        );

        Ok(EmbedResponse {
            status: "success".to_string(),
            stored: result.stored,
            total_in_collection: result.total,
            ids: result.ids,
        })
    }

    /// Rank stored documents against a text query.
    #[instrument(skip(self, request))]
    pub async fn search(&self, request: SearchRequest) -> AppResult<SearchResponse> {
        if request.query.trim().is_empty() {
            return Err(AppError::Input("Query must not be empty".to_string()));
        }

        let top_k = request.top_k.unwrap_or(self.options.default_top_k);
        if top_k == 0 {
            return Err(AppError::Input("top_k must be positive".to_string()));
        }

        if let Some(filter) = &request.filter {
            if filter.0.contains_key(keys::CONTENT) {
                return Err(AppError::Input(format!(
                    "Cannot filter on reserved key '{}'",
                    keys::CONTENT
                )));
            }
        }

        let vector = self.with_deadline(self.model.embed_one(&request.query)).await?;
        let result = self
            .with_deadline(self.store.query(&vector, top_k, request.filter.as_ref()))
            .await?;

        if result.namespace_empty {
            debug!("Namespace '{}' is empty", self.store.namespace());
            return Ok(SearchResponse::empty_knowledge_base(request.query));
        }

        let hits: Vec<SearchHit> = result.matches.into_iter().map(SearchHit::from).collect();
        debug!("Search returned {} results (top_k {})", hits.len(), top_k);

        Ok(SearchResponse::with_results(request.query, hits))
    }

    pub async fn stats(&self) -> AppResult<StatsResponse> {
        let stats = self.with_deadline(self.store.stats()).await?;

        Ok(StatsResponse {
            total_documents: stats.count,
            collection_name: stats.namespace,
            model: self.model.model_name().to_string(),
            embedding_dimension: self.model.dimensions(),
        })
    }

    /// Remove every document in the namespace. Clearing twice is fine.
    pub async fn clear(&self) -> AppResult<ClearResponse> {
        self.with_deadline(self.store.clear()).await?;
        info!("Cleared namespace '{}'", self.store.namespace());
        Ok(ClearResponse::deleted())
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        within(self.options.request_timeout, fut).await
    }
}

async fn within<T>(limit: Duration, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::Timeout(limit))?
}
