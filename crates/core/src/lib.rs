//! Tessera Core Library
//!
//! This crate provides the foundational utilities shared by every Tessera crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Retry and timeout helpers for gateway calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::{AppConfig, NoContextPolicy};
pub use error::{AppError, AppResult};
pub use retry::RetryPolicy;
