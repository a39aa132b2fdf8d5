//! # docq core
//!
//! Dependency-light logic for the docq question-answering pipeline:
//! data models, sentence-aware chunking, vector math with a deterministic
//! fallback embedding, cosine-similarity retrieval, answer prompt
//! assembly, and the bounded session store.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Everything in
//! it is pure or guarded by `std::sync` primitives, so the full pipeline
//! can be exercised offline in tests.

pub mod chunk;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod session;
pub mod vector;
