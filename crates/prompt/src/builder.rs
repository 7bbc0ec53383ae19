//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use handlebars::Handlebars;
use serde_json::Value;
use tessera_core::{AppError, AppResult};

/// Render a definition's system and user templates with `variables`.
///
/// `variables` must be a JSON object; its keys are exposed to the templates.
///
/// # Example
/// ```no_run
/// use tessera_prompt::{build_prompt, builtin_prompt, GROUNDED_ANSWER};
///
/// # fn example() -> tessera_core::AppResult<()> {
/// let def = builtin_prompt(GROUNDED_ANSWER)?;
/// let vars = serde_json::json!({
///     "question": "When was Carthage founded?",
///     "context": "[SOURCE 1] ...",
/// });
/// let built = build_prompt(&def, &vars)?;
/// println!("{}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, variables: &Value) -> AppResult<BuiltPrompt> {
    let object = variables.as_object().ok_or_else(|| {
        AppError::Prompt(format!(
            "Variables for prompt {} must be an object",
            definition.id
        ))
    })?;

    tracing::debug!("Building prompt: {}", definition.id);

    let system = match &definition.system {
        Some(template) => Some(render_template(template, variables)?.trim().to_string()),
        None => None,
    };
    let user = render_template(&definition.template, variables)?
        .trim_end()
        .to_string();

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            resolved_variables: object.keys().cloned().collect(),
        },
    })
}

/// Render a Handlebars template with variables.
pub fn render_template(template: &str, variables: &Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
