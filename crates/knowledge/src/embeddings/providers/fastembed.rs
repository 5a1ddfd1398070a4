//! Local sentence-transformer embeddings through fastembed (ONNX runtime).
//!
//! Model weights are downloaded on first load and cached by fastembed.
//! Inference is CPU-bound, so every batch runs on the blocking pool.

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::{debug, instrument};
use vectorkb_core::{AppError, AppResult};

/// Embedding provider backed by an in-process ONNX model.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
    batch_size: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

/// Map a configured model name to the fastembed model and its dimension.
fn resolve_model(name: &str) -> AppResult<(FastEmbedModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            Ok((FastEmbedModel::AllMiniLML6V2, 384))
        }
        "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => Ok((FastEmbedModel::BGEBaseENV15, 768)),
        other => Err(AppError::Config(format!(
            "Unsupported fastembed model: '{}'. Supported: all-MiniLM-L6-v2, bge-base-en-v1.5",
            other
        ))),
    }
}

impl FastEmbedProvider {
    /// Load the configured model, downloading it if needed.
    ///
    /// # Errors
    /// * `AppError::Config` - unknown model name or a dimension that disagrees with the model
    /// * `AppError::ModelUnavailable` - the model could not be downloaded or initialized
    pub async fn load(config: EmbeddingConfig) -> AppResult<Self> {
        let (model_kind, dimensions) = resolve_model(&config.model)?;

        if dimensions != config.dimensions {
            return Err(AppError::Config(format!(
                "Model '{}' produces {} dimensions but {} are configured",
                config.model, dimensions, config.dimensions
            )));
        }

        debug!("Loading fastembed model '{}'", config.model);

        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(
                InitOptions::new(model_kind).with_show_download_progress(false),
            )
        })
        .await
        .map_err(|e| AppError::ModelUnavailable(format!("Model loading task failed: {}", e)))?
        .map_err(|e| {
            AppError::ModelUnavailable(format!("Failed to load '{}': {}", config.model, e))
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: config.model,
            dimensions,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "fastembed"))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || model.embed(texts, Some(batch_size)))
            .await
            .map_err(|e| AppError::ModelUnavailable(format!("Embedding task failed: {}", e)))?
            .map_err(|e| AppError::ModelUnavailable(format!("fastembed inference failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").unwrap().1, 384);
        assert_eq!(resolve_model("BAAI/bge-base-en-v1.5").unwrap().1, 768);
        assert!(matches!(resolve_model("gpt-embed"), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_dimension_disagreement_rejected_before_download() {
        let config = EmbeddingConfig {
            provider: "fastembed".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 768,
            ..Default::default()
        };

        let result = FastEmbedProvider::load(config).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    /// Downloads model weights; skipped unless VECTORKB_FASTEMBED_TESTS is set.
    #[tokio::test]
    async fn test_fastembed_live() {
        if std::env::var("VECTORKB_FASTEMBED_TESTS").is_err() {
            eprintln!("Skipping fastembed test (set VECTORKB_FASTEMBED_TESTS=1 to run)");
            return;
        }

        let config = EmbeddingConfig {
            provider: "fastembed".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            ..Default::default()
        };

        let provider = FastEmbedProvider::load(config).await.unwrap();
        let embeddings = provider
            .embed_batch(&["hello world".to_string(), "vector search".to_string()])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 384));
    }
}
