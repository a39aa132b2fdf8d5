//! Sentence-boundary text chunker with overlap.
//!
//! Splits document text into [`PassageChunk`]s of at most
//! `chunk_size` characters, accumulating whole sentences and seeding
//! each new chunk with the trailing `chunk_overlap` characters of the
//! previous one so context survives chunk boundaries.
//!
//! # Algorithm
//!
//! 1. Split text into sentences on terminal punctuation (`.`, `!`,
//!    `?`, `…`) followed by whitespace; newlines also end a sentence.
//! 2. Greedily accumulate sentences into a buffer. When the next
//!    sentence would push the buffer past `chunk_size`, close the
//!    buffer as a chunk and seed the next buffer with the closed
//!    chunk's trailing `chunk_overlap` characters.
//! 3. A single sentence longer than `chunk_size` is not split further;
//!    it becomes one oversized chunk. This is a documented limitation.
//! 4. Chunks shorter than `min_chunk_len` are dropped, and surviving
//!    chunks are re-indexed contiguously from 0.
//!
//! All sizes are measured in characters, not bytes, so multibyte text
//! is never split inside a code point.

use sha2::{Digest, Sha256};

use crate::models::PassageChunk;

/// Chunking parameters. Defaults match the pipeline-wide conventions:
/// 500-character chunks, 50 characters of overlap, 50-character floor.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    /// Maximum characters per chunk (oversized sentences excepted).
    pub chunk_size: usize,
    /// Characters of the previous chunk seeded into the next one.
    pub chunk_overlap: usize,
    /// Chunks shorter than this are dropped.
    pub min_chunk_len: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_len: 50,
        }
    }
}

/// Split text into passages, respecting sentence boundaries and overlap.
///
/// Deterministic: identical input always produces identical chunks.
/// Returns an empty vector for text with no sentence surviving the
/// minimum-length floor.
pub fn chunk_text(document_id: &str, text: &str, params: &ChunkParams) -> Vec<PassageChunk> {
    let max_chars = params.chunk_size.max(1);
    let overlap = params.chunk_overlap.min(max_chars.saturating_sub(1));

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;
    // True while `buf` holds only overlap seeded from the previous
    // chunk. A seed-only buffer is never emitted as a chunk of its own;
    // it shrinks instead when the next sentence would not fit.
    let mut buf_is_seed = false;

    for sentence in split_sentences(text) {
        let sent_chars = sentence.chars().count();

        if sent_chars > max_chars {
            if !buf.is_empty() && !buf_is_seed {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.push(sentence.to_string());
            buf = tail_chars(sentence, overlap);
            buf_chars = buf.chars().count();
            buf_is_seed = !buf.is_empty();
            continue;
        }

        if !buf.is_empty() && buf_chars + 1 + sent_chars > max_chars {
            if buf_is_seed {
                let budget = max_chars.saturating_sub(sent_chars + 1);
                buf = tail_chars(&buf, budget);
            } else {
                let closed = std::mem::take(&mut buf);
                let budget = overlap.min(max_chars.saturating_sub(sent_chars + 1));
                buf = tail_chars(&closed, budget);
                pieces.push(closed);
                buf_is_seed = !buf.is_empty();
            }
            buf_chars = buf.chars().count();
        }

        if !buf.is_empty() {
            buf.push(' ');
            buf_chars += 1;
        }
        buf.push_str(sentence);
        buf_chars += sent_chars;
        buf_is_seed = false;
    }

    if !buf.is_empty() && !buf_is_seed {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .filter(|p| p.trim().chars().count() >= params.min_chunk_len)
        .enumerate()
        .map(|(i, p)| make_chunk(document_id, i as i64, p.trim()))
        .collect()
}

/// Split text into sentences on terminal punctuation or newlines.
///
/// A boundary is a run of `.`, `!`, `?`, or `…` (closing quotes and
/// brackets may follow) succeeded by whitespace. Abbreviation handling
/// is deliberately out of scope; "3.14" stays intact because the dot is
/// not followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut after_terminal = false;

    for (i, c) in text.char_indices() {
        if c == '\n' {
            push_sentence(text, start, i, &mut out);
            start = i + c.len_utf8();
            after_terminal = false;
            continue;
        }
        if matches!(c, '.' | '!' | '?' | '…') {
            after_terminal = true;
            continue;
        }
        if after_terminal {
            if matches!(c, '"' | '\'' | ')' | ']' | '»' | '”' | '’') {
                continue;
            }
            if c.is_whitespace() {
                push_sentence(text, start, i, &mut out);
                start = i + c.len_utf8();
            }
            after_terminal = false;
        }
    }
    push_sentence(text, start, text.len(), &mut out);

    out
}

fn push_sentence<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<&'a str>) {
    if start >= end {
        return;
    }
    let s = text[start..end].trim();
    if !s.is_empty() {
        out.push(s);
    }
}

/// Last `n` characters of `s`, never splitting a code point.
fn tail_chars(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}

/// Create a single [`PassageChunk`] with a SHA-256 content hash.
fn make_chunk(document_id: &str, seq: i64, text: &str) -> PassageChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    PassageChunk {
        document_id: document_id.to_string(),
        seq,
        text: text.to_string(),
        hash,
    }
}
