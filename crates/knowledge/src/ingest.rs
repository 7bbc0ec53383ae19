//! Corpus ingestion: chunk, embed and index documents.
//!
//! Ingestion is incremental. A document whose fingerprint matches the
//! manifest is skipped; a changed document has all of its entries replaced in
//! one index write; a document that left the corpus is removed.

use crate::chunker::Chunker;
use crate::embeddings::EmbeddingGateway;
use crate::progress::{IngestPhase, ProgressReporter};
use crate::sources::SourceManager;
use crate::types::{Chunk, Document, IndexEntry, IngestOptions, IngestStats, KnowledgeSource};
use crate::vector_index::VectorIndex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tessera_core::{AppError, AppResult};
use tracing::instrument;

/// SHA-256 over a document's text and metadata, hex encoded.
pub fn fingerprint(document: &Document) -> AppResult<String> {
    let metadata = serde_json::to_vec(&document.metadata)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(document.text.as_bytes());
    hasher.update([0u8]);
    hasher.update(&metadata);
    Ok(hex::encode(hasher.finalize()))
}

/// Writes documents into a collection.
pub struct Ingestor {
    chunker: Chunker,
    embeddings: EmbeddingGateway,
    index: Arc<dyn VectorIndex>,
    sources: SourceManager,
    progress: ProgressReporter,
}

impl Ingestor {
    pub fn new(
        chunker: Chunker,
        embeddings: EmbeddingGateway,
        index: Arc<dyn VectorIndex>,
        sources: SourceManager,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            index,
            sources,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Ingest `documents`, treating them as the complete corpus.
    ///
    /// Documents tracked in the manifest but absent from `documents` are
    /// removed from the index. On error, documents already written stay
    /// indexed and recorded.
    #[instrument(skip(self, documents), fields(documents = documents.len(), reset = options.reset))]
    pub async fn ingest(
        &self,
        documents: &[Document],
        options: IngestOptions,
    ) -> AppResult<IngestStats> {
        let start = Instant::now();
        let mut stats = IngestStats::default();

        if options.reset {
            tracing::info!("Resetting collection before ingestion");
            self.index.reset()?;
            self.sources.clear()?;
        }

        let known: BTreeMap<String, KnowledgeSource> = self
            .sources
            .list()?
            .into_iter()
            .map(|s| (s.document_id.clone(), s))
            .collect();

        let total = documents.len();
        for (i, document) in documents.iter().enumerate() {
            stats.documents_seen += 1;
            let hash = fingerprint(document)?;

            if known
                .get(&document.id)
                .is_some_and(|s| s.content_hash == hash)
            {
                stats.documents_skipped += 1;
                self.progress
                    .emit(IngestPhase::Skip, i + 1, total, document.id.as_str());
                continue;
            }

            let chunk_count = self.index_document(document, i + 1, total).await?;

            self.sources.track(&KnowledgeSource {
                document_id: document.id.clone(),
                path: document
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                content_hash: hash,
                chunk_count,
                byte_count: document.text.len() as u64,
                indexed_at: chrono::Utc::now(),
            })?;

            stats.documents_indexed += 1;
            stats.chunks_indexed += chunk_count;
            stats.bytes_processed += document.text.len() as u64;
        }

        let current: BTreeSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let departed: Vec<&String> = known
            .keys()
            .filter(|id| !current.contains(id.as_str()))
            .collect();

        if !departed.is_empty() {
            for id in &departed {
                let removed = self.index.delete_document(id)?;
                self.progress.emit(
                    IngestPhase::Remove,
                    total,
                    total,
                    format!("{}: {} chunks", id, removed),
                );
                stats.documents_removed += 1;
            }

            let remaining: Vec<KnowledgeSource> = self
                .sources
                .list()?
                .into_iter()
                .filter(|s| current.contains(s.document_id.as_str()))
                .collect();
            self.sources.rewrite(&remaining)?;
        }

        self.index.flush()?;
        stats.duration_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            "Ingestion complete: {} indexed, {} unchanged, {} removed, {} chunks in {:.2}s",
            stats.documents_indexed,
            stats.documents_skipped,
            stats.documents_removed,
            stats.chunks_indexed,
            stats.duration_secs
        );

        Ok(stats)
    }

    async fn index_document(
        &self,
        document: &Document,
        position: usize,
        total: usize,
    ) -> AppResult<usize> {
        let chunks: Vec<Chunk> = self.chunker.chunks(document).collect();
        self.progress.emit(
            IngestPhase::Chunk,
            position,
            total,
            format!("{}: {} chunks", document.id, chunks.len()),
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;
        self.progress.emit(
            IngestPhase::Embed,
            position,
            total,
            format!("{}: model={}", document.id, self.embeddings.model_name()),
        );

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(chunk, vector))
            .collect();

        self.index.replace_document(&document.id, &entries)?;
        self.progress
            .emit(IngestPhase::Index, position, total, document.id.as_str());

        tracing::debug!("Indexed {} ({} chunks)", document.id, entries.len());
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::sqlite_index::SqliteIndex;
    use tempfile::TempDir;
    use tessera_core::config::EmbeddingSettings;

    fn ingestor(temp: &TempDir) -> (Ingestor, Arc<SqliteIndex>) {
        let settings = EmbeddingSettings {
            provider: "trigram".to_string(),
            dimensions: 64,
            ..Default::default()
        };
        let gateway = EmbeddingGateway::new(Arc::new(TrigramProvider::new(64)), &settings);
        let index = Arc::new(SqliteIndex::open_in_memory("sites", 64).unwrap());
        let ingestor = Ingestor::new(
            Chunker::new(40, 10).unwrap(),
            gateway,
            index.clone(),
            SourceManager::for_collection(temp.path(), "sites"),
        );
        (ingestor, index)
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "carthage.txt",
                "Carthage was founded in 814 BC by Phoenician settlers from Tyre.",
            ),
            Document::new(
                "dougga.txt",
                "Dougga contains a well-preserved Roman capitol and theatre.",
            ),
        ]
    }

    #[test]
    fn test_fingerprint_tracks_text_and_metadata() {
        let doc = Document::new("a.txt", "text");
        let same = Document::new("a.txt", "text");
        let mut retitled = Document::new("a.txt", "text");
        retitled.metadata.title = "A".to_string();

        assert_eq!(fingerprint(&doc).unwrap(), fingerprint(&same).unwrap());
        assert_ne!(fingerprint(&doc).unwrap(), fingerprint(&retitled).unwrap());
        assert_eq!(fingerprint(&doc).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_second_run_skips_unchanged_documents() {
        let temp = TempDir::new().unwrap();
        let (ingestor, index) = ingestor(&temp);

        let first = ingestor.ingest(&corpus(), IngestOptions::default()).await.unwrap();
        assert_eq!(first.documents_indexed, 2);
        assert!(first.chunks_indexed >= 2);
        let count = index.count().unwrap();
        assert_eq!(count, first.chunks_indexed);

        let second = ingestor.ingest(&corpus(), IngestOptions::default()).await.unwrap();
        assert_eq!(second.documents_indexed, 0);
        assert_eq!(second.documents_skipped, 2);
        assert_eq!(index.count().unwrap(), count);
    }

    #[tokio::test]
    async fn test_changed_document_is_replaced() {
        let temp = TempDir::new().unwrap();
        let (ingestor, index) = ingestor(&temp);
        ingestor.ingest(&corpus(), IngestOptions::default()).await.unwrap();

        let mut docs = corpus();
        docs[0].text = "Carthage.".to_string();
        let stats = ingestor.ingest(&docs, IngestOptions::default()).await.unwrap();
        assert_eq!(stats.documents_indexed, 1);
        assert_eq!(stats.documents_skipped, 1);

        let carthage_entries = index
            .query(&[0.0; 64], 100, -1.0)
            .unwrap()
            .into_iter()
            .filter(|s| s.chunk.document_id == "carthage.txt")
            .count();
        assert_eq!(carthage_entries, 1);
    }

    #[tokio::test]
    async fn test_departed_documents_are_removed() {
        let temp = TempDir::new().unwrap();
        let (ingestor, index) = ingestor(&temp);
        ingestor.ingest(&corpus(), IngestOptions::default()).await.unwrap();

        let docs = vec![corpus().remove(1)];
        let stats = ingestor.ingest(&docs, IngestOptions::default()).await.unwrap();
        assert_eq!(stats.documents_removed, 1);
        assert_eq!(index.document_count().unwrap(), 1);

        let sources = SourceManager::for_collection(temp.path(), "sites").list().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].document_id, "dougga.txt");
    }

    #[tokio::test]
    async fn test_reset_reindexes_everything() {
        let temp = TempDir::new().unwrap();
        let (ingestor, _index) = ingestor(&temp);
        ingestor.ingest(&corpus(), IngestOptions::default()).await.unwrap();

        let stats = ingestor
            .ingest(&corpus(), IngestOptions { reset: true })
            .await
            .unwrap();
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.documents_skipped, 0);
    }
}
