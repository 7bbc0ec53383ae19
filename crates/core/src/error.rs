//! Error types for Tessera.
//!
//! This module defines a unified error enum shared by every crate in the
//! workspace. The first four variants form the retrieval pipeline's failure
//! taxonomy; the rest cover I/O, providers, storage and serialization.

use thiserror::Error;

/// Unified error type for Tessera.
///
/// All functions in the application return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad chunk/overlap sizes, missing required settings, unknown providers.
    /// Fatal at startup, never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Embedding or generation backend unreachable. Retryable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Vector dimensionality drifted between ingestion and query time.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A gateway call exceeded its configured ceiling.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-retryable LLM provider errors (bad status, malformed payload)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Corpus, index and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the operation that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ServiceUnavailable(_))
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ServiceUnavailable(_) => {
                "The system is temporarily unavailable. Please try again later.".to_string()
            }
            AppError::Timeout(_) => {
                "The request took too long to complete. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
