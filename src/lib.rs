//! # docq
//!
//! Single-source question answering: ingest a web page or document into
//! an in-memory corpus, then stream grounded answers to questions about
//! it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │   Sources     │──▶│    Pipeline      │──▶│  Session store │
//! │ URL/PDF/DOCX  │   │ Extract+Chunk    │   │  (bounded,     │
//! │ Markdown/txt  │   │ +Embed           │   │   in-memory)   │
//! └──────────────┘   └──────────────────┘   └──────┬────────┘
//!                                                  │
//!                           question ──▶ Embed ──▶ Retrieve ──▶ Generate
//!                                                  │              │
//!                                             top-k passages   SSE stream
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docq ingest https://example.com/article      # extraction summary
//! docq ask ./handbook.pdf "what is the leave policy?"
//! docq serve                                   # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`extract`] | File extraction (PDF, DOCX, text) |
//! | [`web`] | URL fetching and HTML content selection |
//! | [`embedding`] | Embedding providers with deterministic fallback |
//! | [`ingest`] | Extract → chunk → embed orchestration |
//! | [`generation`] | Streaming language-model providers |
//! | [`answer`] | Answer event stream over retrieval results |
//! | [`server`] | HTTP API (ingest, ask, health) |
//!
//! Pipeline primitives (chunking, vector math, retrieval, prompt
//! assembly, session store) live in the `docq-core` crate.

pub mod answer;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod server;
pub mod web;
