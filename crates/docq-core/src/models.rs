//! Core data models used throughout docq.
//!
//! These types represent the documents, passages, and vectors that flow
//! through the ingestion and query pipeline. Everything lives in process
//! memory: a [`Corpus`] is built once at ingestion time, handed to the
//! session store, and read (never mutated) at query time.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::vector::FALLBACK_DIMS;

/// One ingested unit: a fetched web page or a read file, reduced to
/// plain text. Immutable after creation.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Document UUID.
    pub id: String,
    /// Best-effort title (HTML `<title>`, file stem, …).
    pub title: Option<String>,
    /// Extracted plain text.
    pub text: String,
    /// When extraction completed.
    pub fetched_at: DateTime<Utc>,
    /// Character count of `text`.
    pub content_length: usize,
}

impl SourceDocument {
    /// Create a document with a fresh UUID and the current timestamp.
    pub fn new(title: Option<String>, text: String) -> Self {
        let content_length = text.chars().count();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            text,
            fetched_at: Utc::now(),
            content_length,
        }
    }
}

/// A bounded slice of a document's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageChunk {
    /// Owning document UUID.
    pub document_id: String,
    /// Position within the document: `0, 1, 2, …` with no gaps.
    pub seq: i64,
    /// Passage text.
    pub text: String,
    /// SHA-256 of `text`, hex-encoded.
    pub hash: String,
}

/// Where a corpus's vectors came from. Query embeddings must use the
/// same origin so similarity comparisons stay meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingOrigin {
    /// A learned embedding model.
    Model { name: String, dims: usize },
    /// The deterministic hash-derived fallback.
    Fallback,
}

impl EmbeddingOrigin {
    /// Vector dimensionality for this origin.
    pub fn dims(&self) -> usize {
        match self {
            EmbeddingOrigin::Model { dims, .. } => *dims,
            EmbeddingOrigin::Fallback => FALLBACK_DIMS,
        }
    }

    /// Human-readable label for logs and CLI output.
    pub fn label(&self) -> String {
        match self {
            EmbeddingOrigin::Model { name, dims } => format!("{} ({} dims)", name, dims),
            EmbeddingOrigin::Fallback => format!("hash-fallback ({} dims)", FALLBACK_DIMS),
        }
    }
}

/// One ingested source held in memory: the document, its passages, and
/// one vector per passage.
///
/// Invariants enforced at construction:
/// - `chunks.len() == vectors.len()` (index-aligned),
/// - every vector has exactly `origin.dims()` dimensions.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub document: SourceDocument,
    pub chunks: Vec<PassageChunk>,
    pub vectors: Vec<Vec<f32>>,
    pub origin: EmbeddingOrigin,
}

impl Corpus {
    /// Build a corpus, rejecting misaligned or mixed-dimension input.
    pub fn new(
        document: SourceDocument,
        chunks: Vec<PassageChunk>,
        vectors: Vec<Vec<f32>>,
        origin: EmbeddingOrigin,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "corpus misaligned: {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = origin.dims();
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                bail!(
                    "vector {} has {} dims, corpus is pinned to {} ({})",
                    i,
                    v.len(),
                    dims,
                    origin.label()
                );
            }
        }
        Ok(Self {
            document,
            chunks,
            vectors,
            origin,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Summary returned to callers after ingestion.
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            title: self.document.title.clone(),
            content_length: self.document.content_length,
            chunk_count: self.chunks.len(),
        }
    }
}

/// Structured ingestion summary, serialized in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub title: Option<String>,
    pub content_length: usize,
    pub chunk_count: usize,
}

/// A retrieved passage with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub chunk: PassageChunk,
    /// Cosine similarity against the query vector, in `[-1, 1]`.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(seq: i64) -> PassageChunk {
        PassageChunk {
            document_id: "d1".to_string(),
            seq,
            text: format!("passage {}", seq),
            hash: String::new(),
        }
    }

    #[test]
    fn test_corpus_rejects_misaligned_lengths() {
        let doc = SourceDocument::new(None, "text".to_string());
        let err = Corpus::new(
            doc,
            vec![make_chunk(0)],
            vec![],
            EmbeddingOrigin::Fallback,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_corpus_rejects_wrong_dims() {
        let doc = SourceDocument::new(None, "text".to_string());
        let err = Corpus::new(
            doc,
            vec![make_chunk(0)],
            vec![vec![0.5f32; 64]],
            EmbeddingOrigin::Fallback,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_corpus_accepts_pinned_dims() {
        let doc = SourceDocument::new(Some("t".to_string()), "text".to_string());
        let corpus = Corpus::new(
            doc,
            vec![make_chunk(0)],
            vec![vec![0.5f32; 128]],
            EmbeddingOrigin::Fallback,
        )
        .unwrap();
        assert!(!corpus.is_empty());
        let summary = corpus.summary();
        assert_eq!(summary.chunk_count, 1);
        assert_eq!(summary.title.as_deref(), Some("t"));
    }

    #[test]
    fn test_model_origin_dims() {
        let origin = EmbeddingOrigin::Model {
            name: "all-minilm-l6-v2".to_string(),
            dims: 384,
        };
        assert_eq!(origin.dims(), 384);
        assert!(origin.label().contains("384"));
    }

    #[test]
    fn test_content_length_counts_chars() {
        let doc = SourceDocument::new(None, "héllo".to_string());
        assert_eq!(doc.content_length, 5);
    }
}
