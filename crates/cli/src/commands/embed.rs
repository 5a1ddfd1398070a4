//! `embed`: embed documents and store them.

use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};
use vectorkb_core::AppResult;
use vectorkb_knowledge::api::parse_request;
use vectorkb_knowledge::config::{get_config_path, save_config};
use vectorkb_knowledge::{EmbedRequest, KnowledgeConfig};

/// Embed and store documents.
///
/// Reads one `{"text", "source"?, "url"?, "title"?, "id"?, "metadata"?}`
/// object or an array of them.
#[derive(Args, Debug)]
pub struct EmbedCommand {
    /// Read the request from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

impl EmbedCommand {
    pub async fn execute(&self, workspace: &Path, config: &KnowledgeConfig) -> AppResult<Value> {
        let request: EmbedRequest = parse_request(&super::read_input(self.input.as_deref())?)?;
        let documents = request.into_documents();
        tracing::info!("Embedding {} documents", documents.len());

        let kb = super::open_knowledge_base(workspace, config).await?;
        let response = kb.embed_and_store(documents).await?;

        // Pin the settings the index was first built with
        if !get_config_path(workspace).exists() {
            save_config(workspace, config)?;
        }

        Ok(serde_json::to_value(response)?)
    }
}
