//! Retrieval-augmented answering over a document corpus.
//!
//! Ingestion turns a corpus directory into a persistent vector index:
//! documents → [`Chunker`] → [`EmbeddingGateway`] → [`VectorIndex`].
//! Querying turns a question into a grounded answer with citations:
//! question → [`DomainGuard`] → [`Retriever`] → [`ContextAssembler`] →
//! generation → [`AnswerComposer`].
//!
//! [`RagSystem`] wires both pipelines from an [`AppConfig`] against one
//! collection. It is constructed explicitly, passed by reference, and closed
//! with [`RagSystem::close`], which flushes the index.
//!
//! # Example
//! ```no_run
//! use tessera_core::AppConfig;
//! use tessera_knowledge::RagSystem;
//!
//! # async fn example() -> tessera_core::AppResult<()> {
//! let config = AppConfig::load()?;
//! let rag = RagSystem::open(&config)?;
//! rag.ingest(false).await?;
//!
//! let answer = rag.answer("When was Carthage founded?").await?;
//! println!("{}", answer.text);
//! for source in &answer.sources {
//!     println!("- {} ({})", source.title, source.relevance);
//! }
//! rag.close()?;
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod ingest;
pub mod progress;
pub mod rag;
pub mod sources;
pub mod sqlite_index;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

pub use chunker::{Chunker, Chunks};
pub use corpus::{load_corpus, MetadataExtractor};
pub use embeddings::{create_provider, EmbeddingGateway, EmbeddingProvider};
pub use ingest::Ingestor;
pub use progress::{IngestPhase, ProgressEvent, ProgressReporter};
pub use rag::{
    Answer, AnswerComposer, AssembledContext, Citation, ContextAssembler, DomainGuard,
    QueryOutcome, QueryState, Relevance, Retriever, Scope,
};
pub use sources::SourceManager;
pub use sqlite_index::SqliteIndex;
pub use types::{
    Chunk, ConversationTurn, Document, DocumentMetadata, IndexEntry, IndexStats, IngestOptions,
    IngestStats, KnowledgeSource, RetrievalResult, ScoredChunk,
};
pub use vector_index::VectorIndex;

use std::sync::Arc;
use tessera_core::{AppConfig, AppResult};
use tessera_llm::GenerationGateway;

/// The ingestion and query pipelines over one collection.
pub struct RagSystem {
    config: AppConfig,
    index: Arc<SqliteIndex>,
    sources: SourceManager,
    ingestor: Ingestor,
    retriever: Retriever,
    composer: AnswerComposer,
}

impl RagSystem {
    /// Validate `config`, load-or-create the collection index, and build the
    /// gateways named in the configuration.
    ///
    /// # Errors
    /// - `InvalidConfiguration` for any invalid setting
    /// - `DimensionMismatch` if the collection was built with another dimension
    pub fn open(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        config.ensure_state_dir()?;

        let collection = &config.rag.collection;
        let index = Arc::new(SqliteIndex::open(
            &config::index_path(&config.workspace, collection),
            collection,
            config.embedding.dimensions,
        )?);

        let embeddings = EmbeddingGateway::from_settings(&config.embedding)?;
        let generation = GenerationGateway::from_settings(&config.generation)?;

        tracing::info!(
            "Opened collection '{}' ({} embeddings via {}, generation via {}/{})",
            collection,
            config.embedding.dimensions,
            embeddings.provider_name(),
            generation.provider_name(),
            generation.model()
        );

        Self::from_parts(config, index, embeddings, generation)
    }

    /// Assemble a system from already-built components.
    pub fn from_parts(
        config: &AppConfig,
        index: Arc<SqliteIndex>,
        embeddings: EmbeddingGateway,
        generation: GenerationGateway,
    ) -> AppResult<Self> {
        let chunker = Chunker::from_settings(&config.rag)?;
        let sources = SourceManager::for_collection(&config.workspace, &config.rag.collection);
        let assembler = ContextAssembler::for_workspace(&config.rag, &config.workspace)?;
        let guard = DomainGuard::from_settings(&config.rag.domain_guard)?;

        let ingestor = Ingestor::new(chunker, embeddings.clone(), index.clone(), sources.clone());
        let retriever = Retriever::new(embeddings, index.clone());
        let composer = AnswerComposer::new(
            retriever.clone(),
            assembler,
            generation,
            &config.rag,
            config.generation.temperature,
        )
        .with_guard(guard);

        Ok(Self {
            config: config.clone(),
            index,
            sources,
            ingestor,
            retriever,
            composer,
        })
    }

    /// Report ingestion progress through `progress`.
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.ingestor = self.ingestor.with_progress(progress);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Ingest the configured corpus directory.
    pub async fn ingest(&self, reset: bool) -> AppResult<IngestStats> {
        let documents = load_corpus(&self.config.corpus_dir)?;
        self.ingest_documents(&documents, IngestOptions { reset })
            .await
    }

    /// Ingest `documents` as the complete corpus.
    pub async fn ingest_documents(
        &self,
        documents: &[Document],
        options: IngestOptions,
    ) -> AppResult<IngestStats> {
        self.ingestor.ingest(documents, options).await
    }

    /// Answer `question` with citations.
    pub async fn answer(&self, question: &str) -> AppResult<Answer> {
        self.composer.answer(question, &[]).await
    }

    /// Answer `question`, with earlier turns supplied as read-only context.
    pub async fn answer_with_history(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> AppResult<Answer> {
        self.composer.answer(question, history).await
    }

    /// Answer `question`, streaming generated fragments to `on_fragment`.
    pub async fn answer_streaming<F>(
        &self,
        question: &str,
        history: &[ConversationTurn],
        on_fragment: F,
    ) -> AppResult<Answer>
    where
        F: FnMut(&str),
    {
        self.composer
            .answer_streaming(question, history, on_fragment)
            .await
    }

    /// Answer `question` and report the query's state transitions.
    pub async fn run_query(&self, question: &str, history: &[ConversationTurn]) -> QueryOutcome {
        self.composer.run(question, history).await
    }

    /// Raw retrieval without generation.
    pub async fn search(
        &self,
        question: &str,
        k: usize,
        min_score: f32,
    ) -> AppResult<RetrievalResult> {
        self.retriever.retrieve(question, k, min_score).await
    }

    /// Documents recorded in the source manifest.
    pub fn sources(&self) -> AppResult<Vec<KnowledgeSource>> {
        self.sources.list()
    }

    pub fn stats(&self) -> AppResult<IndexStats> {
        let last_indexed_at = self.sources.list()?.iter().map(|s| s.indexed_at).max();

        Ok(IndexStats {
            collection: self.config.rag.collection.clone(),
            dimension: self.index.dimension(),
            entry_count: self.index.count()?,
            document_count: self.index.document_count()?,
            db_size_bytes: self.index.size_bytes(),
            last_indexed_at,
        })
    }

    /// Flush the index and release the system.
    pub fn close(self) -> AppResult<()> {
        self.index.flush()?;
        tracing::debug!("Closed collection '{}'", self.config.rag.collection);
        Ok(())
    }
}
