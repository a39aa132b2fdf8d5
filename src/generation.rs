//! Language-model generation providers with token streaming.
//!
//! [`GenerationProvider`] is the capability interface; the closed set of
//! backends is chosen once by [`create_generator`]:
//!
//! - **[`OllamaGenerator`]** — `POST /api/chat` with `stream: true`,
//!   NDJSON chunks.
//! - **[`OpenAiGenerator`]** — `POST /v1/chat/completions` with
//!   `stream: true`, SSE `data:` lines.
//!
//! There is deliberately no retry logic here: a generation failure
//! surfaces once, and the answer layer converts it into a terminal
//! error event on the stream. Dropping the returned stream stops the
//! provider read loop, so a disconnected consumer cancels generation.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use crate::config::GenerationConfig;

/// Generation failure. Converted into a single user-visible error
/// fragment by the answer layer; consumers never see it raw.
#[derive(Debug)]
pub enum GenerateError {
    MissingConfig(String),
    Http(String),
    InvalidResponse(String),
    Stream(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::MissingConfig(what) => write!(f, "missing generation config: {}", what),
            GenerateError::Http(e) => write!(f, "generation request failed: {}", e),
            GenerateError::InvalidResponse(e) => write!(f, "invalid generation response: {}", e),
            GenerateError::Stream(e) => write!(f, "generation stream failed: {}", e),
        }
    }
}

impl std::error::Error for GenerateError {}

/// A stream of answer text fragments. Finite; consumed once.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GenerateError>> + Send>>;

/// Capability interface for streaming text generation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier (e.g. `"llama3.2"`).
    fn model_name(&self) -> &str;

    /// Stream a completion for `prompt`. The returned stream yields
    /// text fragments as the model produces them.
    async fn stream(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TokenStream, GenerateError>;
}

/// Select and construct the configured generation provider.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaGenerator::new(config))),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Read an HTTP byte stream line by line, feeding each complete line to
/// `parse` and forwarding extracted fragments until `parse` signals the
/// end. Shared by both backends; they differ only in line format.
///
/// The read loop stops as soon as the receiver is dropped.
fn pump_lines<F>(response: reqwest::Response, parse: F) -> TokenStream
where
    F: Fn(&str) -> Result<LineEvent, GenerateError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<String, GenerateError>>(32);

    tokio::spawn(async move {
        let mut bytes = response.bytes_stream();
        let mut carry = String::new();

        while let Some(next) = bytes.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(GenerateError::Stream(e.to_string()))).await;
                    return;
                }
            };
            carry.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = carry.find('\n') {
                let line: String = carry.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse(line) {
                    Ok(LineEvent::Fragment(text)) => {
                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                            // Consumer went away; stop generating.
                            return;
                        }
                    }
                    Ok(LineEvent::Skip) => {}
                    Ok(LineEvent::End) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// What a single protocol line contributed.
enum LineEvent {
    Fragment(String),
    Skip,
    End,
}

// ============ Ollama generator ============

/// One NDJSON chunk from Ollama's `/api/chat`.
#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    message: OllamaChatMessage,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    content: String,
}

/// Streaming generation against a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TokenStream, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| GenerateError::Http(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        let response = client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerateError::Http(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerateError::Http(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        Ok(pump_lines(response, parse_ollama_line))
    }
}

/// Parse one NDJSON line from the Ollama chat stream.
fn parse_ollama_line(line: &str) -> Result<LineEvent, GenerateError> {
    let chunk: OllamaChatChunk =
        serde_json::from_str(line).map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;
    if chunk.done {
        return Ok(LineEvent::End);
    }
    if chunk.message.content.is_empty() {
        return Ok(LineEvent::Skip);
    }
    Ok(LineEvent::Fragment(chunk.message.content))
}

// ============ OpenAI generator ============

/// Streaming generation against the OpenAI chat completions API.
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<TokenStream, GenerateError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GenerateError::MissingConfig("OPENAI_API_KEY".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| GenerateError::Http(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerateError::Http(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        Ok(pump_lines(response, parse_openai_sse_line))
    }
}

/// Parse one SSE line from the OpenAI chat completions stream.
///
/// Lines look like `data: {json}`; the terminator is `data: [DONE]`.
/// Anything else (comments, event names) is skipped.
fn parse_openai_sse_line(line: &str) -> Result<LineEvent, GenerateError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(LineEvent::Skip);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(LineEvent::End);
    }

    let json: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;
    let delta = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
        .unwrap_or("");

    if delta.is_empty() {
        Ok(LineEvent::Skip)
    } else {
        Ok(LineEvent::Fragment(delta.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_line_fragment() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hello"},"done":false}"#;
        match parse_ollama_line(line).unwrap() {
            LineEvent::Fragment(text) => assert_eq!(text, "Hello"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn test_parse_ollama_line_done() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert!(matches!(parse_ollama_line(line).unwrap(), LineEvent::End));
    }

    #[test]
    fn test_parse_ollama_garbage_is_invalid() {
        assert!(parse_ollama_line("not json").is_err());
    }

    #[test]
    fn test_parse_openai_sse_fragment() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_openai_sse_line(line).unwrap() {
            LineEvent::Fragment(text) => assert_eq!(text, "Hi"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn test_parse_openai_sse_done() {
        assert!(matches!(
            parse_openai_sse_line("data: [DONE]").unwrap(),
            LineEvent::End
        ));
    }

    #[test]
    fn test_parse_openai_non_data_lines_skipped() {
        assert!(matches!(
            parse_openai_sse_line(": keepalive").unwrap(),
            LineEvent::Skip
        ));
        let empty_delta = r#"data: {"choices":[{"delta":{}}]}"#;
        assert!(matches!(
            parse_openai_sse_line(empty_delta).unwrap(),
            LineEvent::Skip
        ));
    }

    #[test]
    fn test_create_generator_rejects_unknown() {
        let config = GenerationConfig {
            provider: "magic".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_create_ollama_generator() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(generator.model_name(), "llama3.2");
    }
}
