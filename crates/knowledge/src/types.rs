//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Static metadata attached to a document and inherited by its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Title used in citations
    pub title: String,

    /// Archaeological site the document is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Corpus category (defaults to the parent directory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Historical period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    /// Bibliographic source or URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A source document. Immutable once loaded; replaced wholesale on re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the corpus-relative path
    pub id: String,

    /// Location on disk, when loaded from a corpus directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Raw text
    pub text: String,

    /// Static metadata
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Document with a title equal to its identifier and no other metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            metadata: DocumentMetadata {
                title: id.clone(),
                ..Default::default()
            },
            id,
            path: None,
            text: text.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A bounded text segment of a document; the retrieval unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{document_id}#{ordinal}"`
    pub id: String,

    /// Parent document identifier
    pub document_id: String,

    /// Position of the chunk within its document
    pub ordinal: usize,

    /// Chunk text
    pub text: String,

    /// Character offset of the first character in the parent document
    pub start_char: usize,

    /// Character offset one past the last character
    pub end_char: usize,

    /// Metadata inherited from the document
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Canonical chunk identifier.
    pub fn make_id(document_id: &str, ordinal: usize) -> String {
        format!("{}#{}", document_id, ordinal)
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end_char - self.start_char
    }
}

/// The Vector Index's unit of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// A retrieved chunk and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Retrieved chunks, descending by score, ties broken by chunk id ascending.
pub type RetrievalResult = Vec<ScoredChunk>;

/// One previous question/answer exchange, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// A document recorded in the source manifest (`sources.jsonl`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    /// Document identifier
    pub document_id: String,

    /// Path the document was loaded from
    pub path: String,

    /// SHA-256 of the document text and metadata, hex encoded
    pub content_hash: String,

    /// Number of chunks indexed for the document
    pub chunk_count: usize,

    /// Document size in bytes
    pub byte_count: u64,

    /// When the document was indexed
    pub indexed_at: DateTime<Utc>,
}

/// Options for an ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Clear the index and manifest before ingesting
    pub reset: bool,
}

/// Statistics from an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Documents found in the corpus
    pub documents_seen: usize,

    /// Documents chunked, embedded and written
    pub documents_indexed: usize,

    /// Documents unchanged since the last run
    pub documents_skipped: usize,

    /// Documents removed because they left the corpus
    pub documents_removed: usize,

    /// Chunks written
    pub chunks_indexed: usize,

    /// Bytes of text processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Statistics for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Collection name
    pub collection: String,

    /// Embedding dimensionality
    pub dimension: usize,

    /// Number of index entries
    pub entry_count: usize,

    /// Number of distinct documents
    pub document_count: usize,

    /// Database size in bytes
    pub db_size_bytes: u64,

    /// Most recent `indexed_at` in the manifest
    pub last_indexed_at: Option<DateTime<Utc>>,
}
