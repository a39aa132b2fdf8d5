//! # docq CLI
//!
//! The `docq` binary drives the pipeline from the command line.
//!
//! ## Usage
//!
//! ```bash
//! docq --config ./config/docq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq ingest <source>` | Extract, chunk, and embed a source; print a summary |
//! | `docq ask <source> "<question>"` | Ingest a source and stream an answer |
//! | `docq serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Summarize what ingestion would hold in memory
//! docq ingest https://example.com/blog/post
//!
//! # One-shot question answering over a PDF
//! docq ask ./cv.pdf "how many years of Rust experience?"
//!
//! # Serve the API for browser demos
//! docq serve --config ./config/docq.toml
//! ```

mod answer;
mod config;
mod embedding;
mod extract;
mod generation;
mod ingest;
mod server;
mod web;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;

use docq_core::retrieve::rank_passages;

use crate::answer::{answer_stream, AnswerEvent, AnswerParams};
use crate::generation::create_generator;
use crate::ingest::{embed_query, ingest_source};

/// docq — ask questions about a web page or document.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file; built-in defaults apply when the file is absent.
/// See `config/docq.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "docq — retrieval-augmented question answering over a single source",
    version,
    long_about = "docq ingests a source (URL, PDF, DOCX, Markdown, or plain text), splits it \
    into overlapping passages, embeds them, and answers questions grounded in the most similar \
    passages, streaming the answer token by token."
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when absent.
    #[arg(long, global = true, default_value = "./config/docq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a source and print the extraction summary.
    ///
    /// Runs extract → chunk → embed and reports what a session corpus
    /// would hold, without asking anything.
    Ingest {
        /// URL or local file path.
        source: String,
    },

    /// Ingest a source and stream an answer to one question.
    Ask {
        /// URL or local file path.
        source: String,

        /// The question to answer from the source.
        question: String,

        /// Override the number of passages handed to the model.
        #[arg(long)]
        max_chunks: Option<usize>,
    },

    /// Start the HTTP API server.
    ///
    /// Exposes POST /ingest, POST /ask (SSE), and GET /health on the
    /// configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { source } => {
            let corpus = ingest_source(&cfg, &source).await?;
            let summary = corpus.summary();
            println!("ingest {}", source);
            println!(
                "  title: {}",
                summary.title.as_deref().unwrap_or("(untitled)")
            );
            println!("  content length: {} chars", summary.content_length);
            println!("  chunks: {}", summary.chunk_count);
            println!("  embedding: {}", corpus.origin.label());
            println!("ok");
        }

        Commands::Ask {
            source,
            question,
            max_chunks,
        } => {
            let corpus = ingest_source(&cfg, &source).await?;
            let query_vec = embed_query(&cfg, &corpus.origin, &question).await?;
            let retrieval = rank_passages(
                &query_vec,
                &corpus.vectors,
                &corpus.chunks,
                max_chunks.unwrap_or(cfg.retrieval.max_chunks),
            );

            let generator = Arc::from(create_generator(&cfg.generation)?);
            let params = AnswerParams {
                temperature: cfg.generation.temperature,
                max_tokens: cfg.generation.max_tokens,
            };

            let mut events = answer_stream(generator, question, retrieval, params);
            let mut stdout = std::io::stdout();
            while let Some(event) = events.next().await {
                match event {
                    AnswerEvent::Fragment(text) => {
                        print!("{}", text);
                        stdout.flush()?;
                    }
                    AnswerEvent::Done => {
                        println!();
                    }
                    AnswerEvent::Error(message) => {
                        println!();
                        anyhow::bail!("generation failed: {}", message);
                    }
                }
            }
        }

        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
