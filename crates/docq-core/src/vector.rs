//! Vector math and the deterministic fallback embedding.
//!
//! The fallback embedding exists so retrieval keeps working — and stays
//! reproducible in tests — when no embedding model is reachable. It is a
//! pure function of the input text: a SHA-256 hash chain expanded to
//! exactly [`FALLBACK_DIMS`] values in `[0, 1)`.

use sha2::{Digest, Sha256};

/// Dimensionality of fallback vectors.
pub const FALLBACK_DIMS: usize = 128;

/// Deterministic hash-derived embedding.
///
/// The text's UTF-8 bytes are hashed with SHA-256; consecutive 4-byte
/// groups of the digest are read as big-endian `u32` and normalized to
/// `[0, 1)`. The digest is rehashed as often as needed to fill exactly
/// [`FALLBACK_DIMS`] dimensions. Same text, same vector — bit for bit.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut out = Vec::with_capacity(FALLBACK_DIMS);
    let mut block: [u8; 32] = Sha256::digest(text.as_bytes()).into();

    while out.len() < FALLBACK_DIMS {
        for group in block.chunks_exact(4) {
            if out.len() == FALLBACK_DIMS {
                break;
            }
            let n = u32::from_be_bytes([group[0], group[1], group[2], group[3]]);
            // Keep the high 24 bits: an f32 holds them exactly, and the
            // power-of-two division stays strictly below 1.0.
            out.push((n >> 8) as f32 / (1u32 << 24) as f32);
        }
        block = Sha256::digest(block).into();
    }

    out
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// when either norm is zero. Never divides by zero, never panics.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_has_exactly_128_dims() {
        assert_eq!(fallback_embedding("hello world").len(), FALLBACK_DIMS);
        assert_eq!(fallback_embedding("").len(), FALLBACK_DIMS);
    }

    #[test]
    fn test_fallback_deterministic() {
        let a = fallback_embedding("hello world");
        let b = fallback_embedding("hello world");
        assert_eq!(a, b, "same text must produce the bit-identical vector");
    }

    #[test]
    fn test_fallback_values_in_unit_interval() {
        for v in fallback_embedding("some representative passage of text") {
            assert!((0.0..1.0).contains(&v), "value out of range: {}", v);
        }
    }

    #[test]
    fn test_fallback_differs_across_texts() {
        let a = fallback_embedding("hello world");
        let b = fallback_embedding("hello world!");
        assert_ne!(a, b);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero_not_nan() {
        let v = vec![0.3, -0.2, 0.9];
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
