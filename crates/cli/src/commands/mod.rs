//! Command handlers for the vectorkb CLI.
//!
//! Each command reads its JSON request (stdin unless `--input` is given),
//! opens the knowledge base and returns the JSON response for `main` to print.

pub mod clear;
pub mod embed;
pub mod search;
pub mod stats;

pub use clear::ClearCommand;
pub use embed::EmbedCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use std::io::Read;
use std::path::Path;
use vectorkb_core::{AppError, AppResult};
use vectorkb_knowledge::{KnowledgeBase, KnowledgeConfig};

/// Read the request body from a file, or from stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> AppResult<String> {
    let input = match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            AppError::Input(format!("Failed to read input file {:?}: {}", path, e))
        })?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| AppError::Input(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    if input.trim().is_empty() {
        return Err(AppError::Input("Expected a JSON request, got no input".to_string()));
    }

    Ok(input)
}

/// Open the knowledge base for the workspace.
pub async fn open_knowledge_base(
    workspace: &Path,
    config: &KnowledgeConfig,
) -> AppResult<KnowledgeBase> {
    KnowledgeBase::open(workspace, config).await
}
