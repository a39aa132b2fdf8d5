//! HTTP API server.
//!
//! Exposes the pipeline over a small JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Ingest a source into a session corpus |
//! | `POST` | `/ask` | Stream an answer for a session (SSE) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Non-streaming error responses use one JSON shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `ingest_failed`
//! (422), `internal` (500).
//!
//! # Streaming Contract
//!
//! `/ask` responds with Server-Sent Events. Fragments arrive as
//! `event: fragment` with the text in `data`; the stream terminates
//! with exactly one `event: done` or `event: error`. These event names
//! are out-of-band markers — they are never part of the answer text.
//!
//! Querying a session before its ingestion has completed (or after it
//! expired) yields `404 not_found`; callers sequence ingestion and
//! questions themselves.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser demos can
//! call the API directly.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use docq_core::models::IngestSummary;
use docq_core::retrieve::rank_passages;
use docq_core::session::{BoundedSessionStore, SessionStore};

use crate::answer::{answer_stream, error_stream, AnswerEvent, AnswerParams, AnswerStream};
use crate::config::Config;
use crate::generation::{create_generator, GenerationProvider};
use crate::ingest::{embed_query, ingest_source};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    sessions: Arc<dyn SessionStore>,
    generator: Arc<dyn GenerationProvider>,
}

/// Start the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let generator: Arc<dyn GenerationProvider> = Arc::from(create_generator(&config.generation)?);
    let sessions: Arc<dyn SessionStore> = Arc::new(BoundedSessionStore::new(
        config.sessions.max_sessions,
        config.sessions.ttl_secs,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        sessions,
        generator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "docq server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn ingest_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "ingest_failed".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check used by load balancers and monitoring.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    /// URL or local file path.
    source: String,
    /// Session to store the corpus under; generated when absent.
    session: Option<String>,
    /// Per-request chunking overrides.
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Serialize)]
struct IngestResponse {
    session: String,
    #[serde(flatten)]
    summary: IngestSummary,
}

/// Ingest a source and bind the resulting corpus to a session.
async fn handle_ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if request.source.trim().is_empty() {
        return Err(bad_request("source must not be empty"));
    }

    let mut config = (*state.config).clone();
    if let Some(size) = request.chunk_size {
        if size == 0 {
            return Err(bad_request("chunk_size must be > 0"));
        }
        config.chunking.chunk_size = size;
    }
    if let Some(overlap) = request.chunk_overlap {
        config.chunking.chunk_overlap = overlap;
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(bad_request("chunk_overlap must be < chunk_size"));
    }

    let corpus = ingest_source(&config, request.source.trim())
        .await
        .map_err(|e| ingest_failed(format!("could not process source: {}", e)))?;

    let summary = corpus.summary();
    let session = request
        .session
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    state.sessions.put(&session, corpus).await;

    tracing::info!(
        session = %session,
        chunk_count = summary.chunk_count,
        "corpus stored"
    );

    Ok(Json(IngestResponse { session, summary }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    session: String,
    question: String,
    /// Per-request retrieval and generation overrides.
    max_chunks: Option<usize>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Stream an answer for a previously ingested session.
async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let temperature = request
        .temperature
        .unwrap_or(state.config.generation.temperature);
    if !(0.0..=1.0).contains(&temperature) {
        return Err(bad_request("temperature must be in [0.0, 1.0]"));
    }
    let max_tokens = request.max_tokens.unwrap_or(state.config.generation.max_tokens);
    if max_tokens == 0 {
        return Err(bad_request("max_tokens must be > 0"));
    }
    let max_chunks = request
        .max_chunks
        .unwrap_or(state.config.retrieval.max_chunks);
    if max_chunks == 0 {
        return Err(bad_request("max_chunks must be > 0"));
    }

    let corpus = state
        .sessions
        .get(&request.session)
        .await
        .ok_or_else(|| not_found(format!("no session with id: {}", request.session)))?;

    let params = AnswerParams {
        temperature,
        max_tokens,
    };

    let events: AnswerStream = match embed_query(&state.config, &corpus.origin, &request.question)
        .await
    {
        Ok(query_vec) => {
            let retrieval = rank_passages(
                &query_vec,
                &corpus.vectors,
                &corpus.chunks,
                max_chunks,
            );
            answer_stream(
                state.generator.clone(),
                request.question.trim().to_string(),
                retrieval,
                params,
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed");
            error_stream(format!("could not embed question: {}", e))
        }
    };

    let sse = events.map(|event| {
        let sse_event = match event {
            AnswerEvent::Fragment(text) => Event::default().event("fragment").data(text),
            AnswerEvent::Done => Event::default().event("done").data(""),
            AnswerEvent::Error(message) => Event::default().event("error").data(message),
        };
        Ok(sse_event)
    });

    Ok(Sse::new(sse).keep_alive(KeepAlive::default()))
}
