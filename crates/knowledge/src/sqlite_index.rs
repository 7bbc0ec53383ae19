//! SQLite-backed vector index.
//!
//! Entries are persisted in a `chunks` table keyed by `(collection, id)`, with
//! the embedding stored as little-endian `f32` bytes. The collection's
//! dimension is recorded on first open and checked on every later open.
//! Queries run against an in-memory mirror of the table that is updated only
//! after a write commits, so readers never observe a partial batch.

use crate::types::{Chunk, DocumentMetadata, IndexEntry, RetrievalResult};
use crate::vector_index::{check_dimension, rank, VectorIndex};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::{AppError, AppResult};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        category TEXT,
        ordinal INTEGER NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        metadata TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(collection, document_id);
"#;

/// Persistent vector index for one collection.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
    collection: String,
    dimension: usize,
    path: Option<PathBuf>,
}

impl SqliteIndex {
    /// Open (or create) the index at `path` for `collection`.
    ///
    /// # Errors
    /// `DimensionMismatch` if the collection already exists with a different
    /// dimension.
    pub fn open(path: &Path, collection: &str, dimension: usize) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| AppError::Knowledge(format!("Failed to enable WAL: {}", e)))?;
        tracing::debug!("SQLite journal mode: {}", mode);

        let index = Self::init(conn, collection, dimension, Some(path.to_path_buf()))?;
        tracing::debug!(
            "Opened index at {:?} ({} entries in '{}')",
            path,
            index.read_entries()?.len(),
            collection
        );
        Ok(index)
    }

    /// Non-persistent index, for tests and one-off runs.
    pub fn open_in_memory(collection: &str, dimension: usize) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;
        Self::init(conn, collection, dimension, None)
    }

    fn init(
        conn: Connection,
        collection: &str,
        dimension: usize,
        path: Option<PathBuf>,
    ) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        let stored: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to read collection: {}", e)))?;

        match stored {
            Some(stored) if stored as usize != dimension => {
                return Err(AppError::DimensionMismatch {
                    expected: stored as usize,
                    actual: dimension,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![collection, dimension as i64, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(|e| {
                    AppError::Knowledge(format!("Failed to register collection: {}", e))
                })?;
                tracing::info!(
                    "Created collection '{}' with dimension {}",
                    collection,
                    dimension
                );
            }
        }

        let entries = load_entries(&conn, collection)?;

        Ok(Self {
            conn: Mutex::new(conn),
            entries: RwLock::new(entries),
            collection: collection.to_string(),
            dimension,
            path,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Database file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size on disk of the database and its write-ahead log.
    pub fn size_bytes(&self) -> u64 {
        let Some(path) = &self.path else {
            return 0;
        };
        let mut wal = path.clone().into_os_string();
        wal.push("-wal");

        [path.clone(), PathBuf::from(wal)]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    fn lock_conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Knowledge("Index connection lock poisoned".to_string()))
    }

    fn read_entries(&self) -> AppResult<RwLockReadGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .read()
            .map_err(|_| AppError::Knowledge("Index lock poisoned".to_string()))
    }

    fn write_entries(&self) -> AppResult<RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .write()
            .map_err(|_| AppError::Knowledge("Index lock poisoned".to_string()))
    }

    fn check_batch(&self, entries: &[IndexEntry]) -> AppResult<()> {
        entries
            .iter()
            .try_for_each(|entry| check_dimension(self.dimension, &entry.vector))
    }
}

impl VectorIndex for SqliteIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(&self, entries: &[IndexEntry]) -> AppResult<()> {
        self.check_batch(entries)?;

        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;
        for entry in entries {
            insert_entry(&tx, &self.collection, entry)?;
        }
        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit entries: {}", e)))?;

        let mut cache = self.write_entries()?;
        for entry in entries {
            cache.insert(entry.chunk.id.clone(), entry.clone());
        }

        tracing::debug!("Upserted {} entries into '{}'", entries.len(), self.collection);
        Ok(())
    }

    fn replace_document(&self, document_id: &str, entries: &[IndexEntry]) -> AppResult<()> {
        self.check_batch(entries)?;
        if let Some(stray) = entries.iter().find(|e| e.chunk.document_id != document_id) {
            return Err(AppError::Knowledge(format!(
                "Entry {} does not belong to document {}",
                stray.chunk.id, document_id
            )));
        }

        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;
        tx.execute(
            "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
            params![self.collection, document_id],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to delete stale chunks: {}", e)))?;
        for entry in entries {
            insert_entry(&tx, &self.collection, entry)?;
        }
        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit document: {}", e)))?;

        let mut cache = self.write_entries()?;
        cache.retain(|_, entry| entry.chunk.document_id != document_id);
        for entry in entries {
            cache.insert(entry.chunk.id.clone(), entry.clone());
        }

        Ok(())
    }

    fn delete_document(&self, document_id: &str) -> AppResult<usize> {
        let conn = self.lock_conn()?;
        let removed = conn
            .execute(
                "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
                params![self.collection, document_id],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to delete document: {}", e)))?;

        self.write_entries()?
            .retain(|_, entry| entry.chunk.document_id != document_id);

        Ok(removed)
    }

    fn query(&self, vector: &[f32], k: usize, min_score: f32) -> AppResult<RetrievalResult> {
        check_dimension(self.dimension, vector)?;

        let entries = self.read_entries()?;
        let results = rank(vector, entries.values(), k, min_score);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{}, min score {})",
            results.len(),
            k,
            min_score
        );
        Ok(results)
    }

    fn count(&self) -> AppResult<usize> {
        Ok(self.read_entries()?.len())
    }

    fn document_count(&self) -> AppResult<usize> {
        let entries = self.read_entries()?;
        let documents: BTreeSet<&str> = entries
            .values()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        Ok(documents.len())
    }

    fn reset(&self) -> AppResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM chunks WHERE collection = ?1",
            params![self.collection],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to delete chunks: {}", e)))?;

        self.write_entries()?.clear();

        tracing::info!("Reset collection '{}'", self.collection);
        Ok(())
    }

    fn flush(&self) -> AppResult<()> {
        if self.path.is_none() {
            return Ok(());
        }

        let conn = self.lock_conn()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .map_err(|e| AppError::Knowledge(format!("Failed to checkpoint index: {}", e)))?;
        Ok(())
    }
}

fn insert_entry(conn: &Connection, collection: &str, entry: &IndexEntry) -> AppResult<()> {
    let chunk = &entry.chunk;
    let metadata_json = serde_json::to_string(&chunk.metadata)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO chunks
            (collection, id, document_id, category, ordinal, start_char, end_char, text,
             embedding, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            collection,
            chunk.id,
            chunk.document_id,
            chunk.metadata.category,
            chunk.ordinal as i64,
            chunk.start_char as i64,
            chunk.end_char as i64,
            chunk.text,
            embedding_to_bytes(&entry.vector),
            metadata_json,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk {}: {}", chunk.id, e)))?;

    Ok(())
}

type ChunkRow = (String, String, i64, i64, i64, String, Vec<u8>, String);

fn load_entries(conn: &Connection, collection: &str) -> AppResult<BTreeMap<String, IndexEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, document_id, ordinal, start_char, end_char, text, embedding, metadata
             FROM chunks WHERE collection = ?1",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows: Vec<ChunkRow> = stmt
        .query_map(params![collection], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .and_then(|rows| rows.collect())
        .map_err(|e| AppError::Knowledge(format!("Failed to load chunks: {}", e)))?;

    let mut entries = BTreeMap::new();
    for (id, document_id, ordinal, start_char, end_char, text, embedding, metadata) in rows {
        let metadata: DocumentMetadata = serde_json::from_str(&metadata).map_err(|e| {
            AppError::Knowledge(format!("Corrupt metadata for chunk {}: {}", id, e))
        })?;
        let entry = IndexEntry::new(
            Chunk {
                id: id.clone(),
                document_id,
                ordinal: ordinal as usize,
                text,
                start_char: start_char as usize,
                end_char: end_char as usize,
                metadata,
            },
            bytes_to_embedding(&embedding)?,
        );
        entries.insert(id, entry);
    }

    Ok(entries)
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
