//! Stats command handler.

use super::print_json;
use clap::Args;
use tessera_core::{config::AppConfig, AppResult};
use tessera_knowledge::RagSystem;

/// Show collection statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let rag = RagSystem::open(config)?;
        let stats = rag.stats()?;
        rag.close()?;

        if self.json {
            return print_json(&stats);
        }

        println!("Collection: {}", stats.collection);
        println!("Dimension: {}", stats.dimension);
        println!("Documents: {}", stats.document_count);
        println!("Chunks: {}", stats.entry_count);
        println!("Size: {:.2} KB", stats.db_size_bytes as f64 / 1024.0);
        match stats.last_indexed_at {
            Some(at) => println!("Last indexed: {}", at.to_rfc3339()),
            None => println!("Last indexed: never"),
        }

        Ok(())
    }
}
