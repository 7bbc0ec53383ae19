//! Generation provider factory.
//!
//! Resolves a configured provider name to a client implementation.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use std::sync::Arc;
use tessera_core::{AppError, AppResult};

/// Known generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }
}

/// Create a generation client for `provider`.
///
/// # Errors
/// Returns `InvalidConfiguration` if the provider is unknown.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            tracing::debug!("Creating Ollama generation client at {}", base_url);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        None => Err(AppError::InvalidConfiguration(format!(
            "Unknown generation provider: {}",
            provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("ollama"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("OLLAMA"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("openai"), None);
        assert_eq!(ProviderType::Ollama.as_str(), "ollama");
    }

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", Some("http://localhost:8080")).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None) {
            Err(AppError::InvalidConfiguration(msg)) => assert!(msg.contains("unknown")),
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
