//! Prompt loader.
//!
//! Every prompt the pipeline uses ships as a built-in definition. A workspace
//! may override any of them with `.tessera/prompts/<id>.yml`.

use crate::types::PromptDefinition;
use std::path::Path;
use tessera_core::config::STATE_DIR;
use tessera_core::{AppError, AppResult};

/// Answer grounded in retrieved sources.
pub const GROUNDED_ANSWER: &str = "rag.answer.grounded";

/// Nothing relevant was retrieved; the model states so.
pub const NO_CONTEXT_REFUSE: &str = "rag.answer.no_context.refuse";

/// Nothing relevant was retrieved; the model answers from general knowledge.
pub const NO_CONTEXT_GENERAL: &str = "rag.answer.no_context.general";

const BUILTIN_PROMPTS: [(&str, &str); 3] = [
    (
        GROUNDED_ANSWER,
        include_str!("../prompts/rag.answer.grounded.yml"),
    ),
    (
        NO_CONTEXT_REFUSE,
        include_str!("../prompts/rag.answer.no_context.refuse.yml"),
    ),
    (
        NO_CONTEXT_GENERAL,
        include_str!("../prompts/rag.answer.no_context.general.yml"),
    ),
];

/// Load a prompt definition by ID.
///
/// Looks for `<workspace>/.tessera/prompts/<id>.yml` first and falls back to
/// the built-in definition.
///
/// # Example
/// ```no_run
/// use tessera_prompt::{load_prompt, GROUNDED_ANSWER};
/// use std::path::Path;
///
/// # fn example() -> tessera_core::AppResult<()> {
/// let prompt = load_prompt(Path::new("."), GROUNDED_ANSWER)?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, &format!("{:?}", prompt_file))?;
        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}', expected '{}'",
                prompt_file, definition.id, prompt_id
            )));
        }

        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
        return Ok(definition);
    }

    builtin_prompt(prompt_id)
}

/// Built-in definition for `prompt_id`.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// List built-in prompt IDs plus any workspace-only prompt files.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    let prompts_dir = prompts_dir(workspace_path);
    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn prompts_dir(workspace_path: &Path) -> std::path::PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
