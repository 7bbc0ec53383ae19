//! Provider implementations and shared HTTP error classification.

pub mod ollama;

pub use ollama::OllamaClient;

use tessera_core::AppError;

/// Classify a transport failure from `reqwest`.
///
/// Unreachable backends are retryable; an expired request deadline is a timeout.
pub fn map_transport_error(err: &reqwest::Error, context: &str) -> AppError {
    if err.is_timeout() {
        AppError::Timeout(format!("{}: {}", context, err))
    } else if err.is_connect() || err.is_request() {
        AppError::ServiceUnavailable(format!("{}: {}", context, err))
    } else {
        AppError::Llm(format!("{}: {}", context, err))
    }
}

/// Classify a non-success HTTP status. Server-side failures are retryable.
pub fn map_status_error(status: reqwest::StatusCode, body: &str, context: &str) -> AppError {
    if status.is_server_error() {
        AppError::ServiceUnavailable(format!("{} ({}): {}", context, status, body))
    } else {
        AppError::Llm(format!("{} ({}): {}", context, status, body))
    }
}
