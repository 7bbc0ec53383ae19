//! Generation Gateway.
//!
//! Wraps an [`LlmClient`] with the model parameters from configuration, bounded
//! exponential backoff for unavailable backends, and a timeout ceiling. Whole
//! calls are bounded per attempt; streamed calls are bounded per fragment wait.

use crate::client::{LlmClient, LlmRequest, LlmStream};
use crate::factory::create_client;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::config::GenerationSettings;
use tessera_core::retry::{retry_with_backoff, with_timeout};
use tessera_core::{AppError, AppResult, RetryPolicy};
use tracing::instrument;

/// Generation Gateway over a provider client.
#[derive(Clone)]
pub struct GenerationGateway {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    top_p: Option<f32>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GenerationGateway {
    pub fn new(client: Arc<dyn LlmClient>, settings: &GenerationSettings) -> Self {
        Self {
            client,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            retry: settings.retry,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Build the provider client named in `settings` and wrap it.
    pub fn from_settings(settings: &GenerationSettings) -> AppResult<Self> {
        let client = create_client(&settings.provider, Some(&settings.endpoint))?;
        Ok(Self::new(client, settings))
    }

    /// Override the timeout ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    fn request(&self, system: Option<&str>, prompt: &str, temperature: f32) -> LlmRequest {
        LlmRequest::new(prompt, self.model.as_str())
            .with_system(system)
            .with_temperature(temperature)
            .with_max_tokens(self.max_tokens)
            .with_top_p(self.top_p)
    }

    /// Generate the whole answer text for `prompt`.
    ///
    /// `ServiceUnavailable` is retried with backoff; each attempt is bounded by
    /// the timeout and an expired attempt surfaces as `Timeout`.
    #[instrument(skip(self, system, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    pub async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> AppResult<String> {
        let request = self.request(system, prompt, temperature);
        let client = self.client.as_ref();

        let response = retry_with_backoff(&self.retry, "generation", || {
            with_timeout(self.timeout, "generation", client.complete(&request))
        })
        .await?;

        tracing::debug!(
            completion_tokens = response.usage.completion_tokens,
            "Generation complete"
        );
        Ok(response.content)
    }

    /// Open a streamed generation.
    ///
    /// Opening the stream is retried like [`generate`](Self::generate); once
    /// fragments flow, failures are returned to the caller without retry.
    #[instrument(skip(self, system, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    pub async fn generate_stream(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> AppResult<LlmStream> {
        let request = self.request(system, prompt, temperature).with_streaming();
        let client = self.client.as_ref();

        retry_with_backoff(&self.retry, "generation stream", || {
            with_timeout(self.timeout, "generation stream", client.stream(&request))
        })
        .await
    }

    /// Drain `stream`, handing each non-empty fragment to `on_fragment`, and
    /// return the concatenated text.
    ///
    /// Each wait for the next fragment is bounded by the timeout. A stream that
    /// ends without the completion signal is an error.
    pub async fn collect_stream<F>(
        &self,
        mut stream: LlmStream,
        mut on_fragment: F,
    ) -> AppResult<String>
    where
        F: FnMut(&str),
    {
        let mut text = String::new();

        loop {
            let next = with_timeout(self.timeout, "generation fragment", async {
                Ok(stream.next().await)
            })
            .await?;

            match next {
                Some(Ok(chunk)) => {
                    if !chunk.content.is_empty() {
                        on_fragment(&chunk.content);
                        text.push_str(&chunk.content);
                    }
                    if chunk.done {
                        return Ok(text);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(AppError::Llm(
                        "Generation stream ended without a completion signal".to_string(),
                    ))
                }
            }
        }
    }

    /// Streamed generation that reports fragments as they arrive.
    pub async fn stream_text<F>(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: f32,
        on_fragment: F,
    ) -> AppResult<String>
    where
        F: FnMut(&str),
    {
        let stream = self.generate_stream(system, prompt, temperature).await?;
        self.collect_stream(stream, on_fragment).await
    }
}
