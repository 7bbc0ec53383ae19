//! Vector index abstraction.
//!
//! Defines a trait for backend-agnostic vector storage and similarity search,
//! plus the scoring and ranking rules every backend shares.

use crate::types::{IndexEntry, RetrievalResult, ScoredChunk};
use std::cmp::Ordering;
use tessera_core::{AppError, AppResult};

/// Trait for vector index backends.
///
/// Implementations must guarantee:
/// - every stored vector has length [`dimension`](Self::dimension)
/// - upserting an existing chunk id replaces the entry instead of duplicating it
/// - a completed write is visible to every later query
pub trait VectorIndex: Send + Sync {
    /// Dimensionality fixed for the lifetime of the collection.
    fn dimension(&self) -> usize;

    /// Insert or replace entries by chunk id.
    ///
    /// The whole batch is rejected with `DimensionMismatch` if any vector has
    /// the wrong length.
    fn upsert(&self, entries: &[IndexEntry]) -> AppResult<()>;

    /// Atomically replace every entry of `document_id` with `entries`.
    fn replace_document(&self, document_id: &str, entries: &[IndexEntry]) -> AppResult<()>;

    /// Remove every entry of `document_id`, returning how many were removed.
    fn delete_document(&self, document_id: &str) -> AppResult<usize>;

    /// The `k` entries most similar to `vector` with score at least `min_score`.
    ///
    /// Results are ordered by descending score; ties are broken by ascending
    /// chunk id. `k == 0` yields nothing.
    fn query(&self, vector: &[f32], k: usize, min_score: f32) -> AppResult<RetrievalResult>;

    /// Number of entries.
    fn count(&self) -> AppResult<usize>;

    /// Number of distinct documents.
    fn document_count(&self) -> AppResult<usize>;

    /// Remove every entry.
    fn reset(&self) -> AppResult<()>;

    /// Commit any pending changes (for backends that buffer writes).
    fn flush(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Cosine similarity in [-1, 1]. Zero vectors and length mismatches score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Reject vectors whose length differs from `expected`.
pub fn check_dimension(expected: usize, vector: &[f32]) -> AppResult<()> {
    if vector.len() != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Score `entries` against `query` and keep the best `k` at or above `min_score`.
pub fn rank<'a, I>(query: &[f32], entries: I, k: usize, min_score: f32) -> RetrievalResult
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredChunk> = entries
        .into_iter()
        .filter_map(|entry| {
            let score = cosine_similarity(query, &entry.vector);
            (score >= min_score).then(|| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Document};

    fn entry(doc: &str, ordinal: usize, vector: Vec<f32>) -> IndexEntry {
        let document = Document::new(doc, "text");
        IndexEntry::new(
            Chunk {
                id: Chunk::make_id(doc, ordinal),
                document_id: doc.to_string(),
                ordinal,
                text: "text".to_string(),
                start_char: 0,
                end_char: 4,
                metadata: document.metadata,
            },
            vector,
        )
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let entries = vec![
            entry("b.txt", 0, vec![1.0, 0.0]),
            entry("a.txt", 0, vec![1.0, 0.0]),
            entry("c.txt", 0, vec![0.6, 0.8]),
            entry("d.txt", 0, vec![0.0, 1.0]),
        ];

        let ranked = rank(&[1.0, 0.0], &entries, 10, -1.0);
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt#0", "b.txt#0", "c.txt#0", "d.txt#0"]);
    }

    #[test]
    fn test_rank_applies_k_and_min_score() {
        let entries = vec![
            entry("a.txt", 0, vec![1.0, 0.0]),
            entry("b.txt", 0, vec![0.6, 0.8]),
            entry("c.txt", 0, vec![0.0, 1.0]),
        ];

        assert!(rank(&[1.0, 0.0], &entries, 0, -1.0).is_empty());
        assert_eq!(rank(&[1.0, 0.0], &entries, 2, -1.0).len(), 2);

        let ranked = rank(&[1.0, 0.0], &entries, 10, 0.5);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| s.score >= 0.5));
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[0.0; 3]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.0; 4]),
            Err(AppError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }
}
