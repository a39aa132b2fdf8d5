//! Embedding provider abstraction and implementations.
//!
//! [`EmbeddingProvider`] is the capability interface; the concrete
//! backends form a closed set chosen once at construction by
//! [`create_embedder`]:
//!
//! - **[`FallbackEmbedder`]** — deterministic hash-derived vectors; no
//!   network, never fails. The default.
//! - **[`OpenAiEmbedder`]** — `POST /v1/embeddings` with batching,
//!   retry, and backoff.
//! - **[`OllamaEmbedder`]** — a local Ollama instance's `/api/embed`.
//! - **`LocalEmbedder`** — in-process fastembed models behind the
//!   `local-embeddings` feature; loaded lazily, once per process.
//!
//! Failures surface as an explicit [`EmbedError`]; the ingestion caller
//! decides visibly whether to degrade to fallback vectors. Every
//! provider verifies its output against the advertised dimensionality
//! so mixed-dimension corpora are impossible.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama backends retry transient errors with
//! exponential backoff (1s, 2s, 4s, …, capped at 2^5):
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docq_core::models::EmbeddingOrigin;
use docq_core::vector::{fallback_embedding, FALLBACK_DIMS};

use crate::config::EmbeddingConfig;

/// Embedding failure, surfaced to the caller as a value so the
/// degraded-mode branch is visible at the call site.
#[derive(Debug)]
pub enum EmbedError {
    /// Required configuration is missing.
    MissingConfig(String),
    /// Transport-level failure after retries were exhausted.
    Http(String),
    /// The provider answered with something unparseable.
    InvalidResponse(String),
    /// A returned vector did not match the advertised dimensionality.
    DimensionMismatch { expected: usize, got: usize },
    /// Model loading or encoding failed in-process.
    Model(String),
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::MissingConfig(what) => write!(f, "missing embedding config: {}", what),
            EmbedError::Http(e) => write!(f, "embedding request failed: {}", e),
            EmbedError::InvalidResponse(e) => write!(f, "invalid embedding response: {}", e),
            EmbedError::DimensionMismatch { expected, got } => {
                write!(f, "embedding has {} dims, expected {}", got, expected)
            }
            EmbedError::Model(e) => write!(f, "embedding model failed: {}", e),
        }
    }
}

impl std::error::Error for EmbedError {}

/// Capability interface for embedding backends.
///
/// `embed` maps each input text to one vector, preserving order and
/// never dropping inputs; every vector has exactly `dims()` entries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Provenance recorded on corpora built with this provider.
    fn origin(&self) -> EmbeddingOrigin;
    /// Batch-encode texts into vectors, one per input, input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Select and construct the configured provider.
///
/// This is the only place provider names are interpreted; everything
/// downstream works through the [`EmbeddingProvider`] interface.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "fallback" => Ok(Box::new(FallbackEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(local::LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Check a provider response against the advertised dimensionality and
/// input count. Shared by all remote backends.
fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected_count {
        return Err(EmbedError::InvalidResponse(format!(
            "{} vectors for {} inputs",
            vectors.len(),
            expected_count
        )));
    }
    for v in &vectors {
        if v.len() != expected_dims {
            return Err(EmbedError::DimensionMismatch {
                expected: expected_dims,
                got: v.len(),
            });
        }
    }
    Ok(vectors)
}

// ============ Fallback provider ============

/// Deterministic hash-derived embeddings. Pure, offline, never fails;
/// retrieval quality is poor but reproducible, which is exactly what
/// tests and degraded mode need.
pub struct FallbackEmbedder;

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    fn model_name(&self) -> &str {
        "hash-fallback"
    }
    fn dims(&self) -> usize {
        FALLBACK_DIMS
    }
    fn origin(&self) -> EmbeddingOrigin {
        EmbeddingOrigin::Fallback
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| fallback_embedding(t)).collect())
    }
}

// ============ OpenAI provider ============

/// Embedding backend calling the OpenAI `POST /v1/embeddings` endpoint.
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbedError::MissingConfig("OPENAI_API_KEY".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Http(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
                        return parse_openai_embeddings(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbedError::Http(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbedError::Http(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Http(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbedError::Http("embedding failed after retries".into())))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn origin(&self) -> EmbeddingOrigin {
        EmbeddingOrigin::Model {
            name: self.model.clone(),
            dims: self.dims,
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        check_vectors(out, texts.len(), self.dims)
    }
}

/// Parse the OpenAI embeddings response: `data[].embedding` arrays in
/// input order.
fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama provider ============

/// Embedding backend calling a local Ollama instance's `/api/embed`.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn origin(&self) -> EmbeddingOrigin {
        EmbeddingOrigin::Model {
            name: self.model.clone(),
            dims: self.dims,
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Http(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
                        let vectors = parse_ollama_embeddings(&json)?;
                        return check_vectors(vectors, texts.len(), self.dims);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbedError::Http(format!(
                            "Ollama API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbedError::Http(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Http(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbedError::Http("embedding failed after retries".into())))
    }
}

fn parse_ollama_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing embeddings array".to_string()))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| EmbedError::InvalidResponse("embedding is not an array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Local provider (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use std::sync::{Mutex, OnceLock};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use docq_core::models::EmbeddingOrigin;

    use crate::config::EmbeddingConfig;

    use super::{check_vectors, EmbedError, EmbeddingProvider};

    /// The model is loaded once per process, on first use, and shared
    /// behind a mutex; fastembed inference takes `&mut self`.
    static MODEL: OnceLock<Result<Mutex<fastembed::TextEmbedding>, String>> = OnceLock::new();

    /// In-process embedding via fastembed. Models are downloaded on
    /// first use and cached; after that, no network is needed.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        batch_size: usize,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            // Validate the name up front so a typo fails at construction.
            fastembed_model(&model_name)?;
            let dims = config.dims.unwrap_or(default_dims(&model_name));
            Ok(Self {
                model_name,
                dims,
                batch_size: config.batch_size.max(1),
            })
        }
    }

    fn default_dims(model_name: &str) -> usize {
        match model_name {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-small" => 384,
            _ => 384,
        }
    }

    fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
                 nomic-embed-text-v1.5, multilingual-e5-small",
                other
            ),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        fn origin(&self) -> EmbeddingOrigin {
            EmbeddingOrigin::Model {
                name: self.model_name.clone(),
                dims: self.dims,
            }
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let model_name = self.model_name.clone();
            let batch_size = self.batch_size;
            let texts = texts.to_vec();
            let expected = texts.len();

            let vectors = tokio::task::spawn_blocking(move || {
                let slot = MODEL.get_or_init(|| {
                    let model = fastembed_model(&model_name).map_err(|e| e.to_string())?;
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(true),
                    )
                    .map(Mutex::new)
                    .map_err(|e| e.to_string())
                });
                match slot {
                    Ok(model) => model
                        .lock()
                        .unwrap()
                        .embed(texts, Some(batch_size))
                        .map_err(|e| EmbedError::Model(e.to_string())),
                    Err(e) => Err(EmbedError::Model(e.clone())),
                }
            })
            .await
            .map_err(|e| EmbedError::Model(e.to_string()))??;

            check_vectors(vectors, expected, self.dims)
        }
    }
}
