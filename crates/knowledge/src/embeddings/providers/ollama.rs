//! Ollama embedding provider.
//!
//! Ollama's `/api/embeddings` takes one text per request, so a batch is sent
//! as sequential requests. Transport and status failures are classified the
//! same way as generation calls.

use crate::embeddings::provider::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};
use tessera_llm::providers::{map_status_error, map_transport_error};
use tracing::{debug, instrument};

const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Request payload for Ollama embeddings API
#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from Ollama embeddings API
#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama embedding provider using the local API.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Provider for `model` served at `base_url`. No request is made until the
    /// first embedding call.
    pub fn new(base_url: &str, model: &str, dimensions: usize) -> AppResult<Self> {
        if base_url.trim().is_empty() {
            return Err(AppError::InvalidConfiguration(
                "Ollama embedding endpoint must not be empty".to_string(),
            ));
        }

        let client = Client::builder().build().map_err(|e| {
            AppError::InvalidConfiguration(format!(
                "Failed to create HTTP client for Ollama: {}",
                e
            ))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "Failed to reach Ollama embeddings"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status_error(
                status,
                &error_text,
                "Ollama embeddings API error",
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama embedding: {}", e)))?;

        parse_embedding(body)
    }
}

fn parse_embedding(body: EmbeddingResponse) -> AppResult<Vec<f32>> {
    if let Some(error) = body.error {
        return Err(AppError::Llm(format!("Ollama embedding error: {}", error)));
    }
    if body.embedding.is_empty() {
        return Err(AppError::Llm(
            "Ollama returned an empty embedding".to_string(),
        ));
    }
    Ok(body.embedding)
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_single(text).await?);
        }

        debug!("Embedded {} texts", embeddings.len());
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingRequest {
            model: "all-minilm",
            prompt: "Dougga",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "all-minilm");
        assert_eq!(json["prompt"], "Dougga");
    }

    #[test]
    fn test_parse_embedding() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"embedding": [0.1, 0.2, 0.3]}"#).unwrap();
        assert_eq!(parse_embedding(body).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_error_body() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"error": "model 'x' not found"}"#).unwrap();
        assert!(matches!(parse_embedding(body), Err(AppError::Llm(_))));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let provider = OllamaEmbeddingProvider::new("http://localhost:11434/", "all-minilm", 384)
            .unwrap();
        assert_eq!(provider.base_url(), "http://localhost:11434");
        assert!(OllamaEmbeddingProvider::new("  ", "all-minilm", 384).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_service_unavailable() {
        // Port 9 (discard) is closed on test hosts
        let provider = OllamaEmbeddingProvider::new("http://127.0.0.1:9", "all-minilm", 384)
            .unwrap();
        let result = provider.embed("Carthage").await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }
}
