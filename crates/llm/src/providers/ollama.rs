//! Ollama generation provider.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md
//! Streamed responses arrive as newline-delimited JSON objects; a line may be
//! split across network reads, so bytes are buffered until a newline arrives.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::providers::{map_status_error, map_transport_error};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};

/// Ollama `/api/generate` request body.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

/// Ollama `/api/generate` response object (whole body or one stream line).
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama generation client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Client for the default local endpoint, http://localhost:11434.
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_generate_request(&self, request: &LlmRequest, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                top_p: request.top_p,
            },
        }
    }

    async fn post_generate(&self, body: &GenerateRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "Failed to reach Ollama"))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status_error(status, &error_text, "Ollama API error"));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one NDJSON line of a streamed response.
fn parse_stream_line(line: &str) -> AppResult<LlmStreamChunk> {
    let parsed: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse stream chunk: {}", e)))?;

    if let Some(error) = parsed.error {
        return Err(AppError::Llm(format!("Ollama stream error: {}", error)));
    }

    if parsed.done {
        let usage = parsed.usage();
        Ok(LlmStreamChunk::last(parsed.response, Some(usage)))
    } else {
        Ok(LlmStreamChunk::fragment(parsed.response))
    }
}

/// Remove every complete line from `buffer` and parse it. A trailing partial
/// line stays in the buffer for the next read.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<AppResult<LlmStreamChunk>> {
    let mut chunks = Vec::new();

    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        chunks.push(parse_stream_line(line));
    }

    chunks
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending generation request to Ollama");

        let body = self.to_generate_request(request, false);
        let response = self.post_generate(&body).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(AppError::Llm(format!("Ollama error: {}", error)));
        }

        tracing::debug!(
            eval_count = parsed.eval_count.unwrap_or(0),
            "Received completion from Ollama"
        );

        let usage = parsed.usage();
        Ok(LlmResponse {
            content: parsed.response,
            model: parsed.model,
            usage,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Ollama");

        let body = self.to_generate_request(request, true);
        let response = self.post_generate(&body).await?;

        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer, result| {
                let items = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        drain_lines(buffer)
                    }
                    Err(e) => vec![Err(map_transport_error(&e, "Ollama stream interrupted"))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
