//! Search command handler: retrieval without generation.

use super::print_json;
use clap::Args;
use tessera_core::{config::AppConfig, AppResult};
use tessera_knowledge::{Citation, RagSystem};

/// Show the chunks retrieved for a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve (default: from configuration)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum similarity score (default: from configuration)
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let k = self.top_k.unwrap_or(config.rag.top_k);
        let min_score = self.min_score.unwrap_or(config.rag.min_score);

        let rag = RagSystem::open(config)?;
        let results = rag.search(&self.query, k, min_score).await?;
        rag.close()?;

        if self.json {
            return print_json(&results);
        }

        if results.is_empty() {
            println!("No chunk scored at least {:.2}", min_score);
            return Ok(());
        }

        for (i, scored) in results.iter().enumerate() {
            let chunk = &scored.chunk;
            // One citation per chunk, for the shortened excerpt
            let excerpt = Citation::from_chunks(std::slice::from_ref(scored))
                .into_iter()
                .next()
                .map(|c| c.excerpt)
                .unwrap_or_default();

            println!(
                "{}. [{:.3}] {} #{} ({})",
                i + 1,
                scored.score,
                chunk.document_id,
                chunk.ordinal,
                chunk.metadata.site.as_deref().unwrap_or("N/A")
            );
            println!("   {}", excerpt.replace('\n', " "));
        }

        Ok(())
    }
}
