//! Embedding provider trait and factory.

use super::providers::{OllamaEmbeddingProvider, TrigramProvider};
use std::sync::Arc;
use tessera_core::config::{EmbeddingSettings, EMBEDDING_PROVIDERS};
use tessera_core::{AppError, AppResult};

/// Trait for embedding providers.
///
/// Providers make a single attempt per call; retry and timeout policy lives in
/// [`EmbeddingGateway`](super::EmbeddingGateway).
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate one embedding per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Create the embedding provider named in `settings`.
///
/// # Errors
/// `InvalidConfiguration` for an unknown provider.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::new(settings.dimensions))),

        "ollama" => Ok(Arc::new(OllamaEmbeddingProvider::new(
            &settings.endpoint,
            &settings.model,
            settings.dimensions,
        )?)),

        other => Err(AppError::InvalidConfiguration(format!(
            "Unknown embedding provider: '{}'. Supported providers: {}",
            other,
            EMBEDDING_PROVIDERS.join(", ")
        ))),
    }
}
