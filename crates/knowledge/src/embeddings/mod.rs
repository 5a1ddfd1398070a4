//! Embedding model for the knowledge base.
//!
//! [`EmbeddingModel`] is loaded once at startup and shared through `Arc`.
//! It splits inputs into provider-sized batches and checks every response,
//! so callers can rely on one vector per text, in order, of fixed dimension.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};

use crate::types::Embedding;
use std::sync::Arc;
use vectorkb_core::{AppError, AppResult};

/// Text-to-vector function with a fixed output dimension.
#[derive(Debug, Clone)]
pub struct EmbeddingModel {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingModel {
    /// Create the configured provider and check it against the configured dimension.
    ///
    /// Any initialization failure is reported as `ModelUnavailable`, except
    /// configuration mistakes (unknown provider or model), which stay `Config`.
    pub async fn load(config: &EmbeddingConfig) -> AppResult<Self> {
        config.validate()?;

        let provider = create_provider(config).await.map_err(|e| match e {
            AppError::Config(_) | AppError::ModelUnavailable(_) => e,
            other => AppError::ModelUnavailable(other.to_string()),
        })?;

        if provider.dimensions() != config.dimensions {
            return Err(AppError::ModelUnavailable(format!(
                "Provider '{}' reports {} dimensions, {} configured",
                provider.provider_name(),
                provider.dimensions(),
                config.dimensions
            )));
        }

        tracing::debug!(
            "Loaded embedding model: provider={}, model={}, dimensions={}",
            provider.provider_name(),
            provider.model_name(),
            provider.dimensions()
        );

        Ok(Self {
            provider,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Wrap an already constructed provider.
    pub fn from_provider(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed texts, one vector per input, in input order.
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let dimensions = self.dimensions();
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let vectors = self.provider.embed_batch(batch).await?;

            if vectors.len() != batch.len() {
                return Err(AppError::ModelUnavailable(format!(
                    "Provider '{}' returned {} embeddings for {} texts",
                    self.provider.provider_name(),
                    vectors.len(),
                    batch.len()
                )));
            }

            if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
                return Err(AppError::ModelUnavailable(format!(
                    "Provider '{}' returned a {}-dimensional vector, expected {}",
                    self.provider.provider_name(),
                    bad.len(),
                    dimensions
                )));
            }

            embeddings.extend(vectors);
        }

        tracing::debug!(
            "Generated {} embeddings of dimension {}",
            embeddings.len(),
            dimensions
        );

        Ok(embeddings)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> AppResult<Embedding> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::ModelUnavailable("No embedding returned".to_string()))
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the text length into the first component and counts calls.
    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn provider_name(&self) -> &str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting-v1"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    /// Returns vectors of the wrong size.
    #[derive(Debug)]
    struct BrokenProvider {
        drop_one: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        fn provider_name(&self) -> &str {
            "broken"
        }

        fn model_name(&self) -> &str {
            "broken"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            let mut out: Vec<Vec<f32>> = texts.iter().map(|_| vec![0.5; 2]).collect();
            if self.drop_one {
                out.pop();
                out.iter_mut().for_each(|v| v.push(0.5));
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn test_load_default_trigram() {
        let model = EmbeddingModel::load(&EmbeddingConfig::default()).await.unwrap();
        assert_eq!(model.dimensions(), 384);
        assert_eq!(model.provider_name(), "trigram");
        assert_eq!(model.model_name(), "trigram-v1");
    }

    #[tokio::test]
    async fn test_load_unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            EmbeddingModel::load(&config).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_batching_preserves_order() {
        let provider = Arc::new(CountingProvider::default());
        let model = EmbeddingModel::from_provider(provider.clone(), 2);

        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let embeddings = model.embed(&texts).await.unwrap();

        let lengths: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let provider = Arc::new(CountingProvider::default());
        let model = EmbeddingModel::from_provider(provider.clone(), 8);

        assert!(model.embed(&[]).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_model_unavailable() {
        let model = EmbeddingModel::from_provider(Arc::new(BrokenProvider { drop_one: false }), 8);
        let result = model.embed(&["text".to_string()]).await;
        assert!(matches!(result, Err(AppError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn test_wrong_count_is_model_unavailable() {
        let model = EmbeddingModel::from_provider(Arc::new(BrokenProvider { drop_one: true }), 8);
        let result = model.embed(&["a".to_string(), "b".to_string()]).await;
        assert!(matches!(result, Err(AppError::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn test_embed_one() {
        let model = EmbeddingModel::load(&EmbeddingConfig::default()).await.unwrap();
        let a = model.embed_one("AI is great").await.unwrap();
        let b = model.embed(&["AI is great".to_string()]).await.unwrap();
        assert_eq!(a, b[0]);
    }
}
