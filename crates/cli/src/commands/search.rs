//! `search`: rank stored documents against a query.

use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};
use vectorkb_core::AppResult;
use vectorkb_knowledge::api::parse_request;
use vectorkb_knowledge::{KnowledgeConfig, SearchRequest};

/// Search the knowledge base.
///
/// Reads `{"query": string, "top_k"?: int, "filter"?: object}`.
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Read the request from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

impl SearchCommand {
    pub async fn execute(&self, workspace: &Path, config: &KnowledgeConfig) -> AppResult<Value> {
        let request: SearchRequest = parse_request(&super::read_input(self.input.as_deref())?)?;
        tracing::info!("Searching for {:?} (top_k {:?})", request.query, request.top_k);

        let kb = super::open_knowledge_base(workspace, config).await?;
        let response = kb.search(request).await?;

        Ok(serde_json::to_value(response)?)
    }
}
