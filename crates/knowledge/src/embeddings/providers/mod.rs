//! Embedding provider implementations.

#[cfg(feature = "fastembed")]
pub mod fastembed;
pub mod ollama;
pub mod trigram;
