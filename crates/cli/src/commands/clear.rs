//! `clear`: remove every document in the active namespace.

use serde_json::Value;
use std::path::Path;
use vectorkb_core::AppResult;
use vectorkb_knowledge::KnowledgeConfig;

/// Delete all documents in the collection
#[derive(Debug, Default)]
pub struct ClearCommand;

impl ClearCommand {
    pub async fn execute(&self, workspace: &Path, config: &KnowledgeConfig) -> AppResult<Value> {
        tracing::info!("Clearing knowledge base");

        let kb = super::open_knowledge_base(workspace, config).await?;
        Ok(serde_json::to_value(kb.clear().await?)?)
    }
}
