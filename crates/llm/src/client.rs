//! Generation service contract.
//!
//! `LlmClient` is the boundary to an external language-model runtime. A request
//! carries the prompt plus generation parameters; a response carries the text
//! either whole or as a stream of fragments ending with an explicit `done` chunk.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tessera_core::AppResult;

/// Generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Fully rendered prompt text
    pub prompt: String,

    /// Model identifier (e.g., "llama3")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Request a streamed response
    #[serde(default)]
    pub stream: bool,

    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            system: None,
        }
    }

    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_system(mut self, system: Option<&str>) -> Self {
        self.system = system.map(str::to_string);
        self
    }
}

/// Whole generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Token accounting reported by the service
    pub usage: LlmUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One fragment of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmStreamChunk {
    /// Incremental text
    pub content: String,

    /// End-of-stream signal from the service
    #[serde(default)]
    pub done: bool,

    /// Usage statistics, present on the final chunk only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

impl LlmStreamChunk {
    /// Intermediate fragment.
    pub fn fragment(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            usage: None,
        }
    }

    /// Final fragment carrying the completion signal.
    pub fn last(content: impl Into<String>, usage: Option<LlmUsage>) -> Self {
        Self {
            content: content.into(),
            done: true,
            usage,
        }
    }
}

/// Stream of generation fragments. Finite and not restartable.
pub type LlmStream = Pin<Box<dyn Stream<Item = AppResult<LlmStreamChunk>> + Send>>;

/// Language-model provider.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "ollama").
    fn provider_name(&self) -> &str;

    /// Generate the whole response in one call.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Open a streamed response. Implementations force `stream = true`.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream>;
}
