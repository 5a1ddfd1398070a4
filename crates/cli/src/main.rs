//! vectorkb CLI
//!
//! JSON-in, JSON-out front end for the vector knowledge base.
//! Responses and errors go to stdout; diagnostics go to stderr.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ClearCommand, EmbedCommand, SearchCommand, StatsCommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use vectorkb_core::logging::{self, LogFormat};
use vectorkb_core::{config::AppConfig, AppResult};
use vectorkb_knowledge::config::load_config;
use vectorkb_knowledge::ErrorResponse;

/// vectorkb - embed, store and search text by semantic similarity
#[derive(Parser, Debug)]
#[command(name = "vectorkb")]
#[command(about = "Vector knowledge base with local and remote backends")]
#[command(long_about = "Vector knowledge base with local and remote backends.\n\n\
The default embedder is `trigram`, a lexical character-trigram model that runs \
offline. Set `embedding.provider` in .vectorkb/knowledge.yaml to `ollama`, or to \
`fastembed` in builds with the `fastembed` feature, for neural embeddings.")]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VECTORKB_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "VECTORKB_CONFIG")]
    config: Option<PathBuf>,

    /// Vector store backend (local, remote)
    #[arg(short, long, global = true, env = "VECTORKB_BACKEND")]
    backend: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Pretty-print JSON responses
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the knowledge base (JSON request on stdin)
    Search(SearchCommand),

    /// Embed and store documents (JSON request on stdin)
    Embed(EmbedCommand),

    /// Show knowledge base statistics
    Stats,

    /// Delete all documents in the collection
    Clear,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Search(_) => "search",
            Commands::Embed(_) => "embed",
            Commands::Stats => "stats",
            Commands::Clear => "clear",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(response) => {
            print_json(&response, pretty);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            let response = serde_json::to_value(ErrorResponse::from(&e))
                .unwrap_or_else(|_| serde_json::json!({"error": e.to_string()}));
            print_json(&response, pretty);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<Value> {
    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.backend,
        cli.log_level,
        cli.log_format,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.log_format, config.no_color)?;

    tracing::info!("vectorkb starting");
    tracing::debug!("Workspace: {:?}", config.workspace);

    config.ensure_state_dir()?;

    let mut kb_config = load_config(&config.workspace)?;
    if let Some(backend) = &config.backend {
        kb_config.backend = backend.parse()?;
    }
    tracing::debug!("Backend: {:?}", kb_config.backend);

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Search(cmd) => cmd.execute(&config.workspace, &kb_config).await,
        Commands::Embed(cmd) => cmd.execute(&config.workspace, &kb_config).await,
        Commands::Stats => StatsCommand.execute(&config.workspace, &kb_config).await,
        Commands::Clear => ClearCommand.execute(&config.workspace, &kb_config).await,
    };

    if result.is_ok() {
        tracing::info!("Command completed successfully");
    }

    result
}

fn print_json(value: &Value, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };

    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render response: {}", e),
    }
}
