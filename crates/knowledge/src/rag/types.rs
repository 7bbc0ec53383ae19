//! Answer and citation types.

use crate::types::ScoredChunk;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Scores at or above this are labelled high relevance.
pub const HIGH_RELEVANCE: f32 = 0.70;

/// Scores at or above this (and below [`HIGH_RELEVANCE`]) are labelled medium.
pub const MEDIUM_RELEVANCE: f32 = 0.50;

/// Maximum excerpt length in characters.
const MAX_EXCERPT_CHARS: usize = 200;

/// Coarse relevance label shown next to a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    pub fn from_score(score: f32) -> Self {
        if score >= HIGH_RELEVANCE {
            Relevance::High
        } else if score >= MEDIUM_RELEVANCE {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source document cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Document identifier
    pub document_id: String,

    /// Document title
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Start of the best-scoring chunk of this document that was sent to the generator
    pub excerpt: String,

    /// Score of that chunk
    pub score: f32,

    pub relevance: Relevance,
}

impl Citation {
    /// One citation per document, in first-appearance order.
    ///
    /// `included` must be the chunks actually placed in the prompt; the first
    /// chunk seen for a document supplies its excerpt and score.
    pub fn from_chunks(included: &[ScoredChunk]) -> Vec<Citation> {
        let mut seen = HashSet::new();
        included
            .iter()
            .filter(|scored| seen.insert(scored.chunk.document_id.as_str()))
            .map(|scored| {
                let meta = &scored.chunk.metadata;
                Citation {
                    document_id: scored.chunk.document_id.clone(),
                    title: meta.title.clone(),
                    site: meta.site.clone(),
                    period: meta.period.clone(),
                    source: meta.source.clone(),
                    excerpt: excerpt(&scored.chunk.text),
                    score: scored.score,
                    relevance: Relevance::from_score(scored.score),
                }
            })
            .collect()
    }
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// A generated answer and the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated text
    pub text: String,

    /// Cited documents, ordered by their first appearance in the context
    pub sources: Vec<Citation>,

    /// Whether any retrieved context was sent to the generator
    pub grounded: bool,
}

impl Answer {
    /// Cited document identifiers in order.
    pub fn document_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|c| c.document_id.as_str()).collect()
    }
}
