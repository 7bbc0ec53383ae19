//! Source manifest for a collection.
//!
//! `sources.jsonl` records one line per indexed document. Lines are only ever
//! appended during ingestion; the latest line for a document wins. Removing
//! documents rewrites the file through a temporary sibling and a rename.

use crate::config::sources_path;
use crate::types::KnowledgeSource;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tessera_core::{AppError, AppResult};

/// Manages the source manifest of one collection.
#[derive(Debug, Clone)]
pub struct SourceManager {
    path: PathBuf,
}

impl SourceManager {
    /// Manifest stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest of `collection` inside `workspace`.
    pub fn for_collection(workspace: &Path, collection: &str) -> Self {
        Self::new(sources_path(workspace, collection))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Record an indexed document by appending a line.
    pub fn track(&self, source: &KnowledgeSource) -> AppResult<()> {
        self.ensure_parent()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let json_line = serde_json::to_string(source)
            .map_err(|e| AppError::Knowledge(format!("Failed to serialize source: {}", e)))?;

        writeln!(file, "{}", json_line).map_err(|e| {
            AppError::Knowledge(format!("Failed to write to sources.jsonl: {}", e))
        })?;

        file.sync_all()
            .map_err(|e| AppError::Knowledge(format!("Failed to sync sources.jsonl: {}", e)))?;

        tracing::debug!("Tracked source: {}", source.document_id);
        Ok(())
    }

    /// Current state of every tracked document, sorted by document id.
    pub fn list(&self) -> AppResult<Vec<KnowledgeSource>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open sources.jsonl: {}", e)))?;

        let mut latest: BTreeMap<String, KnowledgeSource> = BTreeMap::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                AppError::Knowledge(format!("Failed to read line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let source: KnowledgeSource = serde_json::from_str(&line).map_err(|e| {
                AppError::Knowledge(format!(
                    "Failed to parse line {} in sources.jsonl: {}",
                    line_num + 1,
                    e
                ))
            })?;

            latest.insert(source.document_id.clone(), source);
        }

        Ok(latest.into_values().collect())
    }

    /// Replace the manifest with exactly `sources`.
    pub fn rewrite(&self, sources: &[KnowledgeSource]) -> AppResult<()> {
        self.ensure_parent()?;

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp_path).map_err(|e| {
                AppError::Knowledge(format!("Failed to create {:?}: {}", tmp_path, e))
            })?;
            for source in sources {
                let json_line = serde_json::to_string(source).map_err(|e| {
                    AppError::Knowledge(format!("Failed to serialize source: {}", e))
                })?;
                writeln!(file, "{}", json_line).map_err(|e| {
                    AppError::Knowledge(format!("Failed to write {:?}: {}", tmp_path, e))
                })?;
            }
            file.sync_all()
                .map_err(|e| AppError::Knowledge(format!("Failed to sync {:?}: {}", tmp_path, e)))?;
        }

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to replace sources.jsonl: {}", e)))?;

        tracing::debug!("Rewrote sources.jsonl with {} entries", sources.len());
        Ok(())
    }

    /// Delete the manifest.
    pub fn clear(&self) -> AppResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                AppError::Knowledge(format!("Failed to delete sources.jsonl: {}", e))
            })?;
            tracing::debug!("Cleared sources.jsonl");
        }

        Ok(())
    }
}
