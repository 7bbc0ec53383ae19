//! End-to-end tests for ingestion and grounded answering.

use crate::embeddings::{EmbeddingGateway, EmbeddingProvider};
use crate::rag::QueryState;
use crate::types::{Document, IngestOptions};
use crate::vector_index::VectorIndex;
use crate::{config, RagSystem, SqliteIndex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tessera_core::{AppConfig, AppError, AppResult, RetryPolicy};
use tessera_llm::{
    GenerationGateway, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};

const CARTHAGE: &str = "Carthage was founded in 814 BC by Phoenician settlers.";
const DOUGGA: &str = "Dougga contains a well-preserved Roman temple.";
const QUESTION: &str = "When was Carthage founded?";
const REPLY: &str = "Carthage was founded in 814 BC [SOURCE 1].";

const KEYWORDS: [&str; 4] = ["carthage", "dougga", "temple", "founded"];

/// One axis per keyword plus a small constant axis, so no vector is zero.
#[derive(Debug, Default)]
struct KeywordProvider {
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl KeywordProvider {
    /// Make the next `n` calls fail as if the server were down.
    fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn provider_name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-v1"
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if armed.is_ok() {
            return Err(AppError::ServiceUnavailable("connection refused".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect();
                vector.push(0.1);
                vector
            })
            .collect())
    }
}

/// Replies with fixed text and records every prompt it is sent.
#[derive(Default)]
struct ScriptedClient {
    unavailable: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    fn record(&self, request: &LlmRequest) -> AppResult<()> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if self.unavailable {
            Err(AppError::ServiceUnavailable("model server down".to_string()))
        } else {
            Ok(())
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.record(request)?;
        Ok(LlmResponse {
            content: REPLY.to_string(),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.record(request)?;
        let mut chunks: Vec<AppResult<LlmStreamChunk>> = REPLY
            .split_inclusive(' ')
            .map(|word| Ok(LlmStreamChunk::fragment(word)))
            .collect();
        chunks.push(Ok(LlmStreamChunk::last("", Some(LlmUsage::new(10, 10)))));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct Harness {
    _dir: TempDir,
    rag: RagSystem,
    llm: Arc<ScriptedClient>,
    embedder: Arc<KeywordProvider>,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    }
}

fn harness_with(configure: impl FnOnce(&mut AppConfig), llm: ScriptedClient) -> Harness {
    let dir = TempDir::new().unwrap();
    let corpus = dir.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("carthage.txt"), CARTHAGE).unwrap();
    std::fs::write(corpus.join("dougga.txt"), DOUGGA).unwrap();

    let mut config = AppConfig::for_workspace(dir.path());
    config.corpus_dir = corpus;
    config.rag.collection = "sites".to_string();
    config.rag.min_score = 0.0;
    config.embedding.dimensions = KEYWORDS.len() + 1;
    config.embedding.retry = fast_retry();
    config.generation.retry = fast_retry();
    configure(&mut config);

    let embedder = Arc::new(KeywordProvider::default());
    let llm = Arc::new(llm);

    let index = Arc::new(
        SqliteIndex::open(
            &config::index_path(&config.workspace, &config.rag.collection),
            &config.rag.collection,
            config.embedding.dimensions,
        )
        .unwrap(),
    );
    let embeddings = EmbeddingGateway::new(embedder.clone(), &config.embedding);
    let generation = GenerationGateway::new(llm.clone(), &config.generation);
    let rag = RagSystem::from_parts(&config, index, embeddings, generation).unwrap();

    Harness {
        _dir: dir,
        rag,
        llm,
        embedder,
    }
}

fn harness(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    harness_with(configure, ScriptedClient::default())
}

#[tokio::test]
async fn test_answer_cites_the_matching_document() {
    let h = harness(|c| c.rag.top_k = 1);
    let stats = h.rag.ingest(false).await.unwrap();
    assert_eq!(stats.documents_indexed, 2);

    let answer = h.rag.answer(QUESTION).await.unwrap();

    assert_eq!(answer.text, REPLY);
    assert!(answer.grounded);
    assert_eq!(answer.document_ids(), vec!["carthage.txt"]);
    assert_eq!(answer.sources[0].site.as_deref(), Some("Carthage"));

    let prompt = h.llm.last_prompt();
    assert!(prompt.contains("[SOURCE 1]"));
    assert!(prompt.contains(CARTHAGE));
    assert!(!prompt.contains("[SOURCE 2]"));
}

#[tokio::test]
async fn test_empty_index_answers_without_context() {
    let h = harness(|_| {});

    let answer = h.rag.answer(QUESTION).await.unwrap();

    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
    assert!(h
        .llm
        .last_prompt()
        .contains("Do not answer the question from memory"));
}

#[tokio::test]
async fn test_single_embedding_outage_is_retried() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();

    let before = h.embedder.calls();
    h.embedder.fail_next(1);

    let outcome = h.rag.run_query(QUESTION, &[]).await;

    use QueryState::*;
    assert_eq!(
        outcome.states,
        vec![Idle, Retrieving, Assembling, Generating, Done]
    );
    let answer = outcome.result.unwrap();
    assert_eq!(answer.sources[0].document_id, "carthage.txt");
    // One failed query embedding, then one retry
    assert_eq!(h.embedder.calls() - before, 2);
}

#[tokio::test]
async fn test_embedding_outage_past_retry_budget_fails_query() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();

    let before = h.embedder.calls();
    h.embedder.fail_next(fast_retry().max_attempts as usize);

    let outcome = h.rag.run_query(QUESTION, &[]).await;

    use QueryState::*;
    assert_eq!(outcome.states, vec![Idle, Retrieving, Failed]);
    assert!(matches!(
        outcome.result,
        Err(AppError::ServiceUnavailable(_))
    ));
    assert_eq!(h.embedder.calls() - before, 3);
    assert!(h.llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_greeting_gets_fixed_reply_without_retrieval() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();
    let before = h.embedder.calls();

    let outcome = h.rag.run_query("Bonjour", &[]).await;

    assert_eq!(outcome.states, vec![QueryState::Idle, QueryState::Done]);
    let answer = outcome.result.unwrap();
    assert_eq!(
        answer.text,
        h.rag.config().rag.domain_guard.greeting_reply
    );
    assert!(answer.sources.is_empty());
    assert!(!answer.grounded);
    assert_eq!(h.embedder.calls(), before);
    assert!(h.llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_off_topic_question_is_declined() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();
    let before = h.embedder.calls();

    let mut fragments = Vec::new();
    let answer = h
        .rag
        .answer_streaming("What is the capital of France?", &[], |f| {
            fragments.push(f.to_string())
        })
        .await
        .unwrap();

    let reply = &h.rag.config().rag.domain_guard.off_topic_reply;
    assert_eq!(&answer.text, reply);
    assert_eq!(fragments.concat(), *reply);
    assert!(answer.sources.is_empty());
    assert_eq!(h.embedder.calls(), before);
    assert!(h.llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_in_domain_question_passes_the_guard() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();

    let answer = h
        .rag
        .answer("Tell me about the Roman temple at Dougga")
        .await
        .unwrap();

    assert_eq!(answer.text, REPLY);
    assert_eq!(answer.sources[0].document_id, "dougga.txt");
    assert_eq!(h.llm.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_disabled_guard_answers_any_question() {
    let h = harness(|c| c.rag.domain_guard.enabled = false);
    h.rag.ingest(false).await.unwrap();

    let outcome = h.rag.run_query("What is the capital of France?", &[]).await;

    assert_eq!(outcome.states.last(), Some(&QueryState::Done));
    assert_eq!(outcome.result.unwrap().text, REPLY);
    assert_eq!(h.llm.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reingest_skips_unchanged_documents() {
    let h = harness(|_| {});
    let first = h.rag.ingest(false).await.unwrap();
    let entries = h.rag.stats().unwrap().entry_count;

    let second = h.rag.ingest(false).await.unwrap();
    assert_eq!(second.documents_skipped, first.documents_indexed);
    assert_eq!(second.documents_indexed, 0);
    assert_eq!(h.rag.stats().unwrap().entry_count, entries);

    let reset = h.rag.ingest(true).await.unwrap();
    assert_eq!(reset.documents_indexed, 2);
    assert_eq!(h.rag.stats().unwrap().entry_count, entries);
}

#[tokio::test]
async fn test_departed_documents_are_removed() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();

    let remaining = vec![Document::new("carthage.txt", CARTHAGE)];
    let stats = h
        .rag
        .ingest_documents(&remaining, IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.documents_removed, 1);
    assert_eq!(h.rag.stats().unwrap().document_count, 1);
    let ids: Vec<String> = h.rag.sources().unwrap().into_iter().map(|s| s.document_id).collect();
    assert_eq!(ids, vec!["carthage.txt"]);
}

#[tokio::test]
async fn test_citations_match_the_context_budget() {
    let h = harness(|c| {
        c.rag.top_k = 2;
        c.rag.max_context_chars = 300;
    });
    h.rag.ingest(false).await.unwrap();

    let retrieved = h.rag.search(QUESTION, 2, 0.0).await.unwrap();
    assert_eq!(retrieved.len(), 2);

    let answer = h.rag.answer(QUESTION).await.unwrap();
    assert_eq!(answer.document_ids(), vec!["carthage.txt"]);
    assert!(!h.llm.last_prompt().contains("Dougga"));
}

#[tokio::test]
async fn test_streaming_matches_whole_generation() {
    let h = harness(|_| {});
    h.rag.ingest(false).await.unwrap();

    let whole = h.rag.answer(QUESTION).await.unwrap();

    let mut fragments = Vec::new();
    let streamed = h
        .rag
        .answer_streaming(QUESTION, &[], |f| fragments.push(f.to_string()))
        .await
        .unwrap();

    assert!(fragments.len() > 1);
    assert_eq!(fragments.concat(), REPLY);
    assert_eq!(streamed, whole);
}

#[tokio::test]
async fn test_generation_failure_ends_in_failed_state() {
    let h = harness_with(|_| {}, ScriptedClient::unavailable());
    h.rag.ingest(false).await.unwrap();

    let outcome = h.rag.run_query(QUESTION, &[]).await;

    use QueryState::*;
    assert_eq!(
        outcome.states,
        vec![Idle, Retrieving, Assembling, Generating, Failed]
    );
    assert!(matches!(
        outcome.result,
        Err(AppError::ServiceUnavailable(_))
    ));
    assert_eq!(h.llm.prompts.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_stats_and_close() {
    let h = harness(|_| {});
    assert!(h.rag.stats().unwrap().last_indexed_at.is_none());

    h.rag.ingest(false).await.unwrap();
    let stats = h.rag.stats().unwrap();

    assert_eq!(stats.collection, "sites");
    assert_eq!(stats.dimension, KEYWORDS.len() + 1);
    assert_eq!(stats.document_count, 2);
    assert!(stats.entry_count >= 2);
    assert!(stats.db_size_bytes > 0);
    assert!(stats.last_indexed_at.is_some());

    let Harness { _dir, rag, .. } = h;
    let config = rag.config().clone();
    rag.close().unwrap();

    let reopened = SqliteIndex::open(
        &config::index_path(&config.workspace, "sites"),
        "sites",
        KEYWORDS.len() + 1,
    )
    .unwrap();
    assert_eq!(reopened.document_count().unwrap(), 2);
}
