//! Ingestion pipeline orchestration.
//!
//! Coordinates extract → chunk → embed into an in-memory [`Corpus`].
//! Embedding degradation is an explicit branch here, not a swallowed
//! exception: when the configured provider fails, the corpus is built
//! from deterministic fallback vectors and the switch is logged. The
//! corpus records which origin produced its vectors so query-time
//! embedding always matches.

use std::path::PathBuf;

use anyhow::Result;

use docq_core::chunk::chunk_text;
use docq_core::models::{Corpus, EmbeddingOrigin};
use docq_core::vector::fallback_embedding;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::extract_file;
use crate::web::fetch_url;

/// Where a source reference points.
pub enum Source {
    Url(String),
    File(PathBuf),
}

/// Classify a source reference: anything with an `http(s)` scheme is a
/// URL, everything else is a local path.
pub fn parse_source(reference: &str) -> Source {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        Source::Url(reference.to_string())
    } else {
        Source::File(PathBuf::from(reference))
    }
}

/// Run the full ingestion pipeline for one source.
///
/// Extraction failures propagate — without content there is no corpus.
/// Chunking cannot fail; embedding degrades to fallback vectors.
pub async fn ingest_source(config: &Config, reference: &str) -> Result<Corpus> {
    let document = match parse_source(reference) {
        Source::Url(url) => fetch_url(&config.fetch, &url).await?,
        Source::File(path) => extract_file(&path, config.fetch.min_content_len)?,
    };

    tracing::info!(
        id = %document.id,
        content_length = document.content_length,
        title = document.title.as_deref().unwrap_or("(untitled)"),
        "source extracted"
    );

    let chunks = chunk_text(&document.id, &document.text, &config.chunking.params());
    tracing::debug!(chunk_count = chunks.len(), "document chunked");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embedder = create_embedder(&config.embedding)?;

    let (vectors, origin) = match embedder.embed(&texts).await {
        Ok(vectors) => (vectors, embedder.origin()),
        Err(err) => {
            // Degraded mode, chosen here and visibly: retrieval keeps
            // working on deterministic hash vectors.
            tracing::warn!(
                error = %err,
                provider = embedder.model_name(),
                "embedding provider failed; using deterministic fallback vectors"
            );
            (
                texts.iter().map(|t| fallback_embedding(t)).collect(),
                EmbeddingOrigin::Fallback,
            )
        }
    };

    Corpus::new(document, chunks, vectors, origin)
}

/// Embed a query with the same origin that produced a corpus's vectors.
///
/// A fallback corpus gets a fallback query vector — pure, no provider
/// involved. A model corpus re-uses the configured provider; if that
/// now fails, the error propagates and the caller reports it, because
/// comparing a fallback query against model vectors would be
/// dimensionally and semantically meaningless.
pub async fn embed_query(
    config: &Config,
    origin: &EmbeddingOrigin,
    question: &str,
) -> Result<Vec<f32>> {
    match origin {
        EmbeddingOrigin::Fallback => Ok(fallback_embedding(question)),
        EmbeddingOrigin::Model { .. } => {
            let embedder = create_embedder(&config.embedding)?;
            let mut vectors = embedder.embed(&[question.to_string()]).await?;
            vectors
                .pop()
                .ok_or_else(|| anyhow::anyhow!("empty embedding response for query"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_url_vs_file() {
        assert!(matches!(
            parse_source("https://example.com/page"),
            Source::Url(_)
        ));
        assert!(matches!(parse_source("http://localhost/x"), Source::Url(_)));
        assert!(matches!(parse_source("./notes.md"), Source::File(_)));
        assert!(matches!(parse_source("/tmp/cv.pdf"), Source::File(_)));
    }

    #[tokio::test]
    async fn test_ingest_text_file_builds_fallback_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let text = "Rust has a strong type system. The borrow checker enforces ownership. \
                    Cargo manages dependencies and builds. Crates are published to a registry.";
        std::fs::write(&path, text).unwrap();

        let config = Config::default();
        let corpus = ingest_source(&config, path.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(corpus.origin, EmbeddingOrigin::Fallback);
        assert!(!corpus.is_empty());
        assert_eq!(corpus.chunks.len(), corpus.vectors.len());
        assert_eq!(corpus.document.title.as_deref(), Some("notes"));
        for v in &corpus.vectors {
            assert_eq!(v.len(), 128);
        }
    }

    #[tokio::test]
    async fn test_ingest_too_short_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, "too short").unwrap();

        let config = Config::default();
        let err = ingest_source(&config, path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[tokio::test]
    async fn test_query_embedding_matches_fallback_origin() {
        let config = Config::default();
        let a = embed_query(&config, &EmbeddingOrigin::Fallback, "what is rust?")
            .await
            .unwrap();
        let b = embed_query(&config, &EmbeddingOrigin::Fallback, "what is rust?")
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }
}
