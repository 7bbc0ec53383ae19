//! Embedding Gateway.
//!
//! Turns text into fixed-dimension vectors through a pluggable
//! [`EmbeddingProvider`]. The gateway owns batching, bounded retry of
//! unavailable backends, the per-call timeout, and the dimension check that
//! keeps every vector in a collection the same length.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

use std::sync::Arc;
use std::time::Duration;
use tessera_core::config::EmbeddingSettings;
use tessera_core::retry::{retry_with_backoff, with_timeout};
use tessera_core::{AppError, AppResult, RetryPolicy};
use tracing::instrument;

/// Embedding Gateway over a provider.
#[derive(Debug, Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
    timeout: Duration,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, settings: &EmbeddingSettings) -> Self {
        Self {
            provider,
            dimension: settings.dimensions,
            batch_size: settings.batch_size.max(1),
            retry: settings.retry,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Build the provider named in `settings` and wrap it.
    pub fn from_settings(settings: &EmbeddingSettings) -> AppResult<Self> {
        let provider = create_provider(settings)?;
        tracing::debug!(
            "Embedding provider: {} (model: {}, dimensions: {})",
            provider.provider_name(),
            provider.model_name(),
            settings.dimensions
        );
        Ok(Self::new(provider, settings))
    }

    /// Override the timeout ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dimensionality every returned vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed `texts`, returning one vector per text in input order.
    ///
    /// # Errors
    /// - `ServiceUnavailable` once retries are exhausted
    /// - `Timeout` when a batch exceeds the ceiling
    /// - `DimensionMismatch` when the provider returns a vector of the wrong length
    #[instrument(skip(self, texts), fields(texts = texts.len(), provider = %self.provider.provider_name()))]
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        let provider = self.provider.as_ref();

        for batch in texts.chunks(self.batch_size) {
            let embedded = retry_with_backoff(&self.retry, "embedding", || {
                with_timeout(self.timeout, "embedding", provider.embed_batch(batch))
            })
            .await?;

            if embedded.len() != batch.len() {
                return Err(AppError::Knowledge(format!(
                    "Embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }

            for vector in embedded {
                self.check_dimension(&vector)?;
                vectors.push(vector);
            }
        }

        tracing::debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }

    fn check_dimension(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn settings(dimensions: usize, batch_size: usize) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: "trigram".to_string(),
            dimensions,
            batch_size,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            ..Default::default()
        }
    }

    /// Fails with `ServiceUnavailable` for the first `failures` calls and
    /// records every batch size it sees.
    #[derive(Debug, Default)]
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
        batches: Mutex<Vec<usize>>,
        dimensions: usize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn provider_name(&self) -> &str {
            "flaky"
        }

        fn model_name(&self) -> &str {
            "flaky-v1"
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(AppError::ServiceUnavailable("connection refused".to_string()));
            }
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32; self.dimensions])
                .collect())
        }
    }

    #[derive(Debug)]
    struct SlowProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model_name(&self) -> &str {
            "slow-v1"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let provider = Arc::new(FlakyProvider {
            dimensions: 4,
            ..Default::default()
        });
        let gateway = EmbeddingGateway::new(provider.clone(), &settings(4, 2));

        let vectors = gateway.embed(&texts(5)).await.unwrap();
        assert_eq!(vectors.len(), 5);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
        assert_eq!(*provider.batches.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_retries_unavailable_backend() {
        let provider = Arc::new(FlakyProvider {
            failures: 1,
            dimensions: 4,
            ..Default::default()
        });
        let gateway = EmbeddingGateway::new(provider.clone(), &settings(4, 16));

        let vectors = gateway.embed(&texts(3)).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_surfaces_unavailable_after_retries() {
        let provider = Arc::new(FlakyProvider {
            failures: 10,
            dimensions: 4,
            ..Default::default()
        });
        let gateway = EmbeddingGateway::new(provider.clone(), &settings(4, 16));

        let result = gateway.embed(&texts(1)).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let provider = Arc::new(FlakyProvider {
            dimensions: 3,
            ..Default::default()
        });
        let gateway = EmbeddingGateway::new(provider, &settings(4, 16));

        let result = gateway.embed_one("Kerkouane").await;
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let gateway = EmbeddingGateway::new(Arc::new(SlowProvider), &settings(4, 16))
            .with_timeout(Duration::from_millis(20));

        let result = gateway.embed_one("Sbeitla").await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let gateway = EmbeddingGateway::from_settings(&settings(8, 16)).unwrap();
        assert!(gateway.embed(&[]).await.unwrap().is_empty());
        assert_eq!(gateway.provider_name(), "trigram");
    }
}
