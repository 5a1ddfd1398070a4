//! Knowledge base configuration management.
//!
//! Settings live in `.vectorkb/knowledge.yaml`. A missing file means defaults:
//! trigram embeddings and a local store under `.vectorkb/index`.

use crate::embeddings::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vectorkb_core::config::STATE_DIR;
use vectorkb_core::{AppError, AppResult};

/// Default local collection name.
pub const DEFAULT_COLLECTION: &str = "content_knowledge_base";

/// Which vector store implementation to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Local,
    Remote,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local),
            "remote" | "pinecone" => Ok(StoreBackend::Remote),
            other => Err(AppError::Config(format!(
                "Unknown backend: {}. Supported: local, remote",
                other
            ))),
        }
    }
}

/// Full knowledge base configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeConfig {
    /// Active vector store
    #[serde(default)]
    pub backend: StoreBackend,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Local store settings
    #[serde(default)]
    pub local: LocalStoreConfig,

    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteStoreConfig,

    /// top_k used when a search request omits it
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Deadline for each embedding or store call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Local on-disk store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalStoreConfig {
    /// Index directory, relative to the workspace unless absolute
    #[serde(default = "default_local_path")]
    pub path: PathBuf,

    /// Collection (namespace) name
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Remote vector database settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteStoreConfig {
    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Index name
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Namespace inside the index
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Similarity metric used when creating the index
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Serverless cloud used when creating the index
    #[serde(default = "default_cloud")]
    pub cloud: String,

    /// Serverless region used when creating the index
    #[serde(default = "default_region")]
    pub region: String,

    /// Per-request HTTP timeout
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transport errors, 429 and 5xx
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Largest batch accepted in one upsert request
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_local_path() -> PathBuf {
    PathBuf::from(STATE_DIR).join("index")
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_endpoint() -> String {
    "https://api.pinecone.io/v1".to_string()
}

fn default_api_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_index_name() -> String {
    "linkedin-knowledge-base".to_string()
}

fn default_namespace() -> String {
    "content".to_string()
}

fn default_metric() -> String {
    "cosine".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_batch() -> usize {
    1000
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            embedding: EmbeddingConfig::default(),
            local: LocalStoreConfig::default(),
            remote: RemoteStoreConfig::default(),
            default_top_k: default_top_k(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
            collection: default_collection(),
        }
    }
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            index_name: default_index_name(),
            namespace: default_namespace(),
            metric: default_metric(),
            cloud: default_cloud(),
            region: default_region(),
            timeout_secs: default_http_timeout_secs(),
            max_retries: default_max_retries(),
            max_batch: default_max_batch(),
        }
    }
}

impl KnowledgeConfig {
    /// Check the settings that can be validated without touching a backend.
    pub fn validate(&self) -> AppResult<()> {
        self.embedding.validate()?;

        if self.default_top_k == 0 {
            return Err(AppError::Config("default_top_k must be positive".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        match self.backend {
            StoreBackend::Local => {
                if self.local.collection.trim().is_empty() {
                    return Err(AppError::Config(
                        "local.collection must not be empty".to_string(),
                    ));
                }
            }
            StoreBackend::Remote => {
                if self.remote.namespace.trim().is_empty() {
                    return Err(AppError::Config(
                        "remote.namespace must be set explicitly".to_string(),
                    ));
                }
                if self.remote.max_batch == 0 {
                    return Err(AppError::Config(
                        "remote.max_batch must be positive".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Resolve the local index directory against the workspace.
    pub fn local_index_dir(&self, workspace: &Path) -> PathBuf {
        if self.local.path.is_absolute() {
            self.local.path.clone()
        } else {
            workspace.join(&self.local.path)
        }
    }
}

impl RemoteStoreConfig {
    /// Read the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> AppResult<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    self.api_key_env
                ))
            })
    }
}

/// Load knowledge base configuration, falling back to defaults.
pub fn load_config(workspace: &Path) -> AppResult<KnowledgeConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("No knowledge config at {:?}, using defaults", config_path);
        return Ok(KnowledgeConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: KnowledgeConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Loaded knowledge config from {:?}", config_path);
    Ok(config)
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge config to {:?}", config_path);
    Ok(())
}

/// Get the path to the knowledge config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("knowledge.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config.backend, StoreBackend::Local);
        assert_eq!(config.local.collection, DEFAULT_COLLECTION);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.remote.index_name, "linkedin-knowledge-base");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeConfig::default();
        config.backend = StoreBackend::Remote;
        config.remote.namespace = "posts".to_string();
        config.embedding = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "backend: remote\nremote:\n  namespace: drafts\n").unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.backend, StoreBackend::Remote);
        assert_eq!(config.remote.namespace, "drafts");
        assert_eq!(config.remote.metric, "cosine");
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("LOCAL".parse::<StoreBackend>().unwrap(), StoreBackend::Local);
        assert_eq!("pinecone".parse::<StoreBackend>().unwrap(), StoreBackend::Remote);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_validate_remote_namespace_required() {
        let mut config = KnowledgeConfig::default();
        config.backend = StoreBackend::Remote;
        config.remote.namespace = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_index_dir_relative_to_workspace() {
        let config = KnowledgeConfig::default();
        let dir = config.local_index_dir(Path::new("/srv/kb"));
        assert_eq!(dir, PathBuf::from("/srv/kb/.vectorkb/index"));
    }
}
