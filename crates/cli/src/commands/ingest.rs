//! Ingest command handler.

use super::print_json;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::{config::AppConfig, AppResult};
use tessera_knowledge::{ProgressReporter, RagSystem};

/// Index the corpus directory
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Corpus directory (default: from configuration)
    #[arg(long, env = "TESSERA_CORPUS")]
    pub corpus: Option<PathBuf>,

    /// Clear the collection before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Ingesting corpus from {:?}", config.corpus_dir);

        let mut rag = RagSystem::open(config)?;
        if !self.json {
            rag = rag.with_progress(ProgressReporter::new(Arc::new(|event| {
                eprintln!("{}", event.format_simple());
            })));
        }

        let stats = rag.ingest(self.reset).await?;
        rag.close()?;

        if self.json {
            print_json(&stats)?;
        } else {
            println!(
                "Indexed {} of {} documents ({} chunks, {} bytes) in {:.2}s",
                stats.documents_indexed,
                stats.documents_seen,
                stats.chunks_indexed,
                stats.bytes_processed,
                stats.duration_secs
            );
            if stats.documents_skipped > 0 {
                println!("Skipped {} unchanged documents", stats.documents_skipped);
            }
            if stats.documents_removed > 0 {
                println!("Removed {} documents no longer in the corpus", stats.documents_removed);
            }
        }

        Ok(())
    }
}
