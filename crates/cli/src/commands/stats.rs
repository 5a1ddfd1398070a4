//! `stats`: document count and model of the active namespace.

use serde_json::Value;
use std::path::Path;
use vectorkb_core::AppResult;
use vectorkb_knowledge::KnowledgeConfig;

/// Show knowledge base statistics
#[derive(Debug, Default)]
pub struct StatsCommand;

impl StatsCommand {
    pub async fn execute(&self, workspace: &Path, config: &KnowledgeConfig) -> AppResult<Value> {
        let kb = super::open_knowledge_base(workspace, config).await?;
        Ok(serde_json::to_value(kb.stats().await?)?)
    }
}
