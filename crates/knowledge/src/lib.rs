//! Vector knowledge base.
//!
//! Turns text into embeddings, stores them with metadata in a local SQLite
//! index or a remote vector database, and answers similarity queries through
//! one backend-independent contract.

pub mod api;
pub mod config;
pub mod embeddings;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use api::{
    ClearResponse, EmbedItem, EmbedRequest, EmbedResponse, ErrorResponse, SearchHit,
    SearchRequest, SearchResponse, StatsResponse,
};
pub use config::{KnowledgeConfig, StoreBackend};
pub use embeddings::{EmbeddingConfig, EmbeddingModel, EmbeddingProvider};
pub use service::{KnowledgeBase, ServiceOptions};
pub use store::{LocalVectorStore, RemoteVectorStore, VectorStore};
pub use types::{
    Document, Metadata, MetadataFilter, MetadataValue, QueryMatch, QueryResult, StoreStats,
    UpsertResult, VectorRecord,
};
