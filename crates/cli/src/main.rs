//! Tessera CLI
//!
//! Main entry point for the tessera command-line tool.
//! Ingests a document corpus and answers questions grounded in it.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, IngestCommand, SearchCommand, StatsCommand};
use std::path::PathBuf;
use tessera_core::{config::AppConfig, logging};

/// Tessera - grounded question answering over a local corpus
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Grounded question answering over a local document corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "TESSERA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "TESSERA_LLM_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index the corpus directory
    Ingest(IngestCommand),

    /// Answer a question from the indexed corpus
    Ask(AskCommand),

    /// Show the chunks retrieved for a query
    Search(SearchCommand),

    /// Show collection statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let corpus = match &cli.command {
        Commands::Ingest(cmd) => cmd.corpus.clone(),
        _ => None,
    };

    let config = AppConfig::load_with(cli.workspace, cli.config)
        .context("Failed to load configuration")?
        .with_overrides(
            None,
            None,
            corpus,
            cli.model,
            cli.log_level,
            cli.verbose,
            cli.no_color,
            cli.log_json,
        );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)
        .context("Failed to initialize logging")?;

    tracing::info!("Tessera CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Collection: {}", config.rag.collection);

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Ask(_) => "ask",
        Commands::Search(_) => "search",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match result {
        Ok(()) => {
            tracing::info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}
