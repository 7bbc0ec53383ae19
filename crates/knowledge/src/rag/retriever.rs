//! Retriever: question text to scored chunks.

use crate::embeddings::EmbeddingGateway;
use crate::types::RetrievalResult;
use crate::vector_index::VectorIndex;
use std::sync::Arc;
use tessera_core::AppResult;
use tracing::instrument;

/// Embeds questions and queries the index.
#[derive(Clone)]
pub struct Retriever {
    embeddings: EmbeddingGateway,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embeddings: EmbeddingGateway, index: Arc<dyn VectorIndex>) -> Self {
        Self { embeddings, index }
    }

    /// Up to `k` chunks scoring at least `min_score`, best first.
    ///
    /// An empty result means the corpus has no good match; it is not an error.
    #[instrument(skip(self, question))]
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        min_score: f32,
    ) -> AppResult<RetrievalResult> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embeddings.embed_one(question).await?;
        let mut results = self.index.query(&vector, k, min_score)?;

        // Backends may approximate; the bounds are enforced here regardless
        results.retain(|s| s.score >= min_score);
        results.truncate(k);

        match results.first() {
            Some(best) => tracing::info!(
                "Retrieved {} chunks (best: {} at {:.3})",
                results.len(),
                best.chunk.id,
                best.score
            ),
            None => tracing::info!("No chunk scored at least {:.2}", min_score),
        }

        Ok(results)
    }
}
