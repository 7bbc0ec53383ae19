//! Answer Composer.
//!
//! Drives one query through `Idle → Retrieving → Assembling → Generating`,
//! ending in `Done` or `Failed`. Any stage error moves straight to `Failed`
//! and is returned unchanged. Citations come from the chunks the assembler
//! actually placed in the prompt.
//!
//! With a [`DomainGuard`], greetings and off-topic questions go `Idle → Done`
//! with the guard's fixed reply; no gateway is called for them.

use crate::rag::context::ContextAssembler;
use crate::rag::guard::{DomainGuard, Scope};
use crate::rag::retriever::Retriever;
use crate::rag::types::{Answer, Citation};
use crate::types::ConversationTurn;
use std::fmt;
use tessera_core::config::RagSettings;
use tessera_core::AppResult;
use tessera_llm::GenerationGateway;
use tracing::instrument;

/// Lifecycle of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl QueryState {
    /// Whether `next` may directly follow `self`.
    pub fn can_transition_to(self, next: QueryState) -> bool {
        use QueryState::*;
        matches!(
            (self, next),
            (Idle, Retrieving)
                | (Idle, Done)
                | (Retrieving, Assembling)
                | (Assembling, Generating)
                | (Generating, Done)
                | (Retrieving, Failed)
                | (Assembling, Failed)
                | (Generating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Idle => "idle",
            QueryState::Retrieving => "retrieving",
            QueryState::Assembling => "assembling",
            QueryState::Generating => "generating",
            QueryState::Done => "done",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Every state a query passed through, and how it ended.
#[derive(Debug)]
pub struct QueryOutcome {
    pub states: Vec<QueryState>,
    pub result: AppResult<Answer>,
}

impl QueryOutcome {
    pub fn final_state(&self) -> QueryState {
        self.states.last().copied().unwrap_or(QueryState::Idle)
    }
}

struct StateTrail {
    states: Vec<QueryState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            states: vec![QueryState::Idle],
        }
    }

    fn current(&self) -> QueryState {
        self.states.last().copied().unwrap_or(QueryState::Idle)
    }

    fn advance(&mut self, next: QueryState) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal transition {} -> {}",
            self.current(),
            next
        );
        tracing::debug!("Query {} -> {}", self.current(), next);
        self.states.push(next);
    }
}

/// Orchestrates retrieval, assembly and generation for a question.
#[derive(Clone)]
pub struct AnswerComposer {
    retriever: Retriever,
    assembler: ContextAssembler,
    generation: GenerationGateway,
    guard: Option<DomainGuard>,
    top_k: usize,
    min_score: f32,
    temperature: f32,
}

impl AnswerComposer {
    pub fn new(
        retriever: Retriever,
        assembler: ContextAssembler,
        generation: GenerationGateway,
        rag: &RagSettings,
        temperature: f32,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generation,
            guard: None,
            top_k: rag.top_k,
            min_score: rag.min_score,
            temperature,
        }
    }

    /// Screen questions with `guard` before retrieval.
    pub fn with_guard(mut self, guard: Option<DomainGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Answer `question`, generating the whole text at once.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> AppResult<Answer> {
        self.run(question, history).await.result
    }

    /// Answer `question`, handing each generated fragment to `on_fragment`
    /// as it arrives. Returns the same answer as [`answer`](Self::answer).
    pub async fn answer_streaming<F>(
        &self,
        question: &str,
        history: &[ConversationTurn],
        on_fragment: F,
    ) -> AppResult<Answer>
    where
        F: FnMut(&str),
    {
        self.execute(question, history, Some(on_fragment))
            .await
            .result
    }

    /// Answer `question` and report the states the query went through.
    pub async fn run(&self, question: &str, history: &[ConversationTurn]) -> QueryOutcome {
        self.execute(question, history, None::<fn(&str)>).await
    }

    #[instrument(skip_all, fields(question_chars = question.chars().count()))]
    async fn execute<F>(
        &self,
        question: &str,
        history: &[ConversationTurn],
        on_fragment: Option<F>,
    ) -> QueryOutcome
    where
        F: FnMut(&str),
    {
        let mut trail = StateTrail::new();
        let result = self
            .compose(question, history, on_fragment, &mut trail)
            .await;

        match &result {
            Ok(answer) => {
                trail.advance(QueryState::Done);
                tracing::info!(
                    "Answered with {} sources ({} chars)",
                    answer.sources.len(),
                    answer.text.len()
                );
            }
            Err(e) => {
                trail.advance(QueryState::Failed);
                tracing::warn!("Query failed: {}", e);
            }
        }

        QueryOutcome {
            states: trail.states,
            result,
        }
    }

    async fn compose<F>(
        &self,
        question: &str,
        history: &[ConversationTurn],
        on_fragment: Option<F>,
        trail: &mut StateTrail,
    ) -> AppResult<Answer>
    where
        F: FnMut(&str),
    {
        if let Some(reply) = self.screen(question) {
            if let Some(mut on_fragment) = on_fragment {
                on_fragment(&reply);
            }
            return Ok(Answer {
                text: reply,
                sources: Vec::new(),
                grounded: false,
            });
        }

        trail.advance(QueryState::Retrieving);
        let retrieved = self
            .retriever
            .retrieve(question, self.top_k, self.min_score)
            .await?;

        trail.advance(QueryState::Assembling);
        let context = self.assembler.assemble(question, &retrieved, history)?;

        trail.advance(QueryState::Generating);
        let system = context.prompt.system.as_deref();
        let user = context.prompt.user.as_str();
        let text = match on_fragment {
            Some(on_fragment) => {
                let stream = self
                    .generation
                    .generate_stream(system, user, self.temperature)
                    .await?;
                self.generation.collect_stream(stream, on_fragment).await?
            }
            None => {
                self.generation
                    .generate(system, user, self.temperature)
                    .await?
            }
        };

        Ok(Answer {
            text: text.trim().to_string(),
            sources: Citation::from_chunks(&context.included),
            grounded: context.is_grounded(),
        })
    }

    fn screen(&self, question: &str) -> Option<String> {
        let guard = self.guard.as_ref()?;
        let scope = guard.classify(question);
        let reply = guard.reply(scope)?;
        tracing::info!(
            "Question screened out as {}",
            if scope == Scope::Greeting { "greeting" } else { "off-topic" }
        );
        Some(reply.to_string())
    }
}
