//! Context Assembler.
//!
//! Renders retrieved chunks as numbered `[SOURCE n]` blocks inside the
//! grounded-answer prompt. Blocks are added best first until the next one
//! would exceed the character budget; that block and everything after it are
//! dropped whole, so no chunk text is ever cut. With nothing to include, the
//! configured no-context prompt is rendered instead.

use crate::types::{ConversationTurn, ScoredChunk};
use serde_json::json;
use std::path::Path;
use tessera_core::config::{NoContextPolicy, RagSettings};
use tessera_core::AppResult;
use tessera_prompt::{
    build_prompt, builtin_prompt, load_prompt, BuiltPrompt, PromptDefinition, GROUNDED_ANSWER,
    NO_CONTEXT_GENERAL, NO_CONTEXT_REFUSE,
};

const BLOCK_SEPARATOR: &str = "\n\n";

/// The prompt for one query and the chunks it carries.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub prompt: BuiltPrompt,

    /// Chunks present in the prompt, in prompt order
    pub included: Vec<ScoredChunk>,

    /// Retrieved chunks left out to respect the budget
    pub dropped: usize,

    /// Characters of source blocks in the prompt
    pub context_chars: usize,
}

impl AssembledContext {
    /// Whether the grounded prompt was used.
    pub fn is_grounded(&self) -> bool {
        !self.included.is_empty()
    }
}

/// Builds bounded prompts from retrieval results.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_context_chars: usize,
    policy: NoContextPolicy,
    history_turns: usize,
    grounded: PromptDefinition,
    no_context: PromptDefinition,
}

impl ContextAssembler {
    /// Assembler using the built-in prompts.
    pub fn new(settings: &RagSettings) -> AppResult<Self> {
        Ok(Self::with_prompts(
            settings,
            builtin_prompt(GROUNDED_ANSWER)?,
            builtin_prompt(no_context_prompt_id(settings.no_context_policy))?,
        ))
    }

    /// Assembler using prompts from `workspace`, falling back to built-ins.
    pub fn for_workspace(settings: &RagSettings, workspace: &Path) -> AppResult<Self> {
        Ok(Self::with_prompts(
            settings,
            load_prompt(workspace, GROUNDED_ANSWER)?,
            load_prompt(workspace, no_context_prompt_id(settings.no_context_policy))?,
        ))
    }

    fn with_prompts(
        settings: &RagSettings,
        grounded: PromptDefinition,
        no_context: PromptDefinition,
    ) -> Self {
        Self {
            max_context_chars: settings.max_context_chars,
            policy: settings.no_context_policy,
            history_turns: settings.history_turns,
            grounded,
            no_context,
        }
    }

    pub fn policy(&self) -> NoContextPolicy {
        self.policy
    }

    /// Build the prompt for `question` from `retrieved` and prior `history`.
    ///
    /// `retrieved` is ranked best first before blocks are laid out. History is
    /// rendered separately and never counts toward the budget.
    pub fn assemble(
        &self,
        question: &str,
        retrieved: &[ScoredChunk],
        history: &[ConversationTurn],
    ) -> AppResult<AssembledContext> {
        let mut ranked = retrieved.to_vec();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut blocks = Vec::new();
        let mut context_chars = 0;
        for scored in &ranked {
            let block = format_block(blocks.len() + 1, scored);
            let separator = if blocks.is_empty() {
                0
            } else {
                BLOCK_SEPARATOR.len()
            };
            let block_chars = block.chars().count() + separator;
            if context_chars + block_chars > self.max_context_chars {
                break;
            }
            context_chars += block_chars;
            blocks.push(block);
        }

        let included: Vec<ScoredChunk> = ranked.iter().take(blocks.len()).cloned().collect();
        let dropped = ranked.len() - included.len();
        if dropped > 0 {
            tracing::debug!(
                "Dropped {} of {} chunks to fit {} context chars",
                dropped,
                ranked.len(),
                self.max_context_chars
            );
        }

        let history = render_history(history, self.history_turns);
        let prompt = if included.is_empty() {
            tracing::info!(
                "No usable context; applying '{}' policy",
                self.policy.as_str()
            );
            build_prompt(
                &self.no_context,
                &json!({ "question": question, "history": history }),
            )?
        } else {
            build_prompt(
                &self.grounded,
                &json!({
                    "question": question,
                    "context": blocks.join(BLOCK_SEPARATOR),
                    "history": history,
                }),
            )?
        };

        Ok(AssembledContext {
            prompt,
            included,
            dropped,
            context_chars,
        })
    }
}

fn no_context_prompt_id(policy: NoContextPolicy) -> &'static str {
    match policy {
        NoContextPolicy::Refuse => NO_CONTEXT_REFUSE,
        NoContextPolicy::GeneralKnowledge => NO_CONTEXT_GENERAL,
    }
}

fn format_block(n: usize, scored: &ScoredChunk) -> String {
    let chunk = &scored.chunk;
    let meta = &chunk.metadata;
    let na = "N/A";

    format!(
        "[SOURCE {n}]\n\
         Title: {title}\n\
         Site: {site}\n\
         Period: {period}\n\
         Source: {source}\n\
         Document: {doc}\n\
         Relevance: {score:.2}\n\
         ---\n\
         {text}\n\
         {rule}",
        n = n,
        title = meta.title,
        site = meta.site.as_deref().unwrap_or(na),
        period = meta.period.as_deref().unwrap_or(na),
        source = meta.source.as_deref().unwrap_or(na),
        doc = chunk.document_id,
        score = scored.score,
        text = chunk.text.trim_end(),
        rule = "=".repeat(50),
    )
}

fn render_history(history: &[ConversationTurn], turns: usize) -> String {
    let skip = history.len().saturating_sub(turns);
    history[skip..]
        .iter()
        .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}
