//! Prompt system for Tessera.
//!
//! This crate provides prompt management with:
//! - Built-in prompt definitions for grounded and no-context answers
//! - YAML overrides under `.tessera/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, render_template};
pub use loader::{
    builtin_prompt, list_prompts, load_prompt, GROUNDED_ANSWER, NO_CONTEXT_GENERAL,
    NO_CONTEXT_REFUSE,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
