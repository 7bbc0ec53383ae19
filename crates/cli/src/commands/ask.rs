//! Ask command handler.
//!
//! Answers one question from the indexed corpus, streaming the text by
//! default, then lists the cited sources.

use super::print_json;
use clap::Args;
use std::io::Write;
use tessera_core::{config::AppConfig, AppResult};
use tessera_knowledge::{Answer, RagSystem};

/// Answer a question from the indexed corpus
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum similarity score for a chunk to be used
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Print the answer only once it is complete
    #[arg(long)]
    pub no_stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if let Some(top_k) = self.top_k {
            config.rag.top_k = top_k;
        }
        if let Some(min_score) = self.min_score {
            config.rag.min_score = min_score;
        }

        let rag = RagSystem::open(&config)?;

        let answer = if self.json || self.no_stream {
            rag.answer(&self.question).await?
        } else {
            let answer = rag
                .answer_streaming(&self.question, &[], |fragment| {
                    print!("{}", fragment);
                    std::io::stdout().flush().ok();
                })
                .await?;
            println!();
            answer
        };
        rag.close()?;

        if self.json {
            return print_json(&answer);
        }

        if self.no_stream {
            println!("{}", answer.text);
        }
        print_sources(&answer);

        Ok(())
    }
}

fn print_sources(answer: &Answer) {
    println!();
    if answer.sources.is_empty() {
        println!("Sources: (no matching documents)");
        return;
    }

    println!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        let mut details = Vec::new();
        if let Some(site) = &source.site {
            details.push(site.as_str());
        }
        if let Some(period) = &source.period {
            details.push(period.as_str());
        }

        if details.is_empty() {
            println!("[{}] {}", i + 1, source.title);
        } else {
            println!("[{}] {} ({})", i + 1, source.title, details.join(", "));
        }
        println!(
            "    relevance: {} ({:.2}), document: {}",
            source.relevance, source.score, source.document_id
        );
        if let Some(origin) = &source.source {
            println!("    source: {}", origin);
        }
    }
}
