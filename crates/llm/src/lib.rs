//! Generation Gateway for Tessera.
//!
//! This crate provides a provider-agnostic abstraction over language-model
//! runtimes, and the [`GenerationGateway`] that applies model parameters,
//! retries and timeouts on top of it.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use tessera_core::config::GenerationSettings;
//! use tessera_llm::GenerationGateway;
//!
//! # async fn example() -> tessera_core::AppResult<()> {
//! let gateway = GenerationGateway::from_settings(&GenerationSettings::default())?;
//! let text = gateway.generate(None, "When was Carthage founded?", 0.3).await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod gateway;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::{create_client, ProviderType};
pub use gateway::GenerationGateway;
pub use providers::OllamaClient;
