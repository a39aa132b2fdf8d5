//! Top-k passage retrieval by cosine similarity.

use crate::models::{PassageChunk, ScoredPassage};
use crate::vector::cosine_similarity;

/// Rank passages against a query vector and return the top `max_chunks`.
///
/// `vectors` and `chunks` must be index-aligned and of equal length —
/// that alignment is the caller's invariant ([`Corpus`](crate::models::Corpus)
/// enforces it at construction). Results are ordered by strictly
/// non-increasing score; equal scores keep corpus order (the sort is
/// stable), so retrieval is deterministic. An empty corpus yields an
/// empty result, not an error.
pub fn rank_passages(
    query_vec: &[f32],
    vectors: &[Vec<f32>],
    chunks: &[PassageChunk],
    max_chunks: usize,
) -> Vec<ScoredPassage> {
    let mut scored: Vec<ScoredPassage> = vectors
        .iter()
        .zip(chunks.iter())
        .map(|(v, c)| ScoredPassage {
            chunk: c.clone(),
            score: cosine_similarity(query_vec, v),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(max_chunks);

    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(seq: i64, text: &str) -> PassageChunk {
        PassageChunk {
            document_id: "d1".to_string(),
            seq,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_empty_corpus_returns_empty() {
        let result = rank_passages(&[1.0, 0.0], &[], &[], 3);
        assert!(result.is_empty());
    }

    #[test]
    fn test_ranks_by_descending_similarity() {
        let query = vec![1.0, 0.0];
        let vectors = vec![
            vec![0.0, 1.0],  // orthogonal
            vec![1.0, 0.0],  // identical
            vec![1.0, 1.0],  // in between
        ];
        let chunks = vec![
            make_chunk(0, "orthogonal"),
            make_chunk(1, "identical"),
            make_chunk(2, "between"),
        ];
        let result = rank_passages(&query, &vectors, &chunks, 3);
        assert_eq!(result[0].chunk.text, "identical");
        assert_eq!(result[1].chunk.text, "between");
        assert_eq!(result[2].chunk.text, "orthogonal");
        for pair in result.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_truncates_to_max_chunks() {
        let query = vec![1.0, 0.0];
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        let chunks: Vec<PassageChunk> = (0..10).map(|i| make_chunk(i, "p")).collect();
        let result = rank_passages(&query, &vectors, &chunks, 4);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        let query = vec![1.0, 0.0];
        let same = vec![1.0, 0.0];
        let vectors = vec![same.clone(), same.clone(), same];
        let chunks = vec![
            make_chunk(0, "first"),
            make_chunk(1, "second"),
            make_chunk(2, "third"),
        ];
        let result = rank_passages(&query, &vectors, &chunks, 3);
        let order: Vec<i64> = result.iter().map(|r| r.chunk.seq).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_query_vector_scores_all_zero() {
        let query = vec![0.0, 0.0];
        let vectors = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let chunks = vec![make_chunk(0, "a"), make_chunk(1, "b")];
        let result = rank_passages(&query, &vectors, &chunks, 2);
        assert!(result.iter().all(|r| r.score == 0.0));
    }
}
