//! Answer streaming: retrieval results in, answer events out.
//!
//! This layer owns the stream contract promised to consumers: zero or
//! more [`AnswerEvent::Fragment`]s followed by exactly one terminal
//! event, [`AnswerEvent::Done`] or [`AnswerEvent::Error`]. Provider
//! failures — at start or mid-stream — are folded into a single error
//! event; a raw error never crosses this boundary.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use docq_core::models::ScoredPassage;
use docq_core::prompt::{build_answer_prompt, NO_CONTEXT_REPLY};

use crate::generation::GenerationProvider;

/// One event on the answer channel. `Done` and `Error` are the
/// out-of-band markers layered over the text stream; each stream ends
/// with exactly one of them.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    Fragment(String),
    Done,
    Error(String),
}

/// A finite stream of [`AnswerEvent`]s, consumed once.
pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

/// Generation knobs carried from config into the provider call.
#[derive(Debug, Clone, Copy)]
pub struct AnswerParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Stream an answer for `question` grounded in `retrieval`.
///
/// With an empty retrieval the stream immediately yields the fixed
/// no-context reply and terminates — the provider is never called.
/// Otherwise the prompt is built from the retrieved passages and token
/// streaming is delegated to the provider. If the consumer drops the
/// stream, generation stops with it.
pub fn answer_stream(
    provider: Arc<dyn GenerationProvider>,
    question: String,
    retrieval: Vec<ScoredPassage>,
    params: AnswerParams,
) -> AnswerStream {
    if retrieval.is_empty() {
        return Box::pin(tokio_stream::iter(vec![
            AnswerEvent::Fragment(NO_CONTEXT_REPLY.to_string()),
            AnswerEvent::Done,
        ]));
    }

    let (tx, rx) = mpsc::channel::<AnswerEvent>(32);

    tokio::spawn(async move {
        let prompt = build_answer_prompt(&question, &retrieval);

        let mut tokens = match provider
            .stream(&prompt, params.temperature, params.max_tokens)
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "generation failed to start");
                let _ = tx.send(AnswerEvent::Error(e.to_string())).await;
                return;
            }
        };

        while let Some(item) = tokens.next().await {
            match item {
                Ok(fragment) => {
                    if tx.send(AnswerEvent::Fragment(fragment)).await.is_err() {
                        // Consumer disconnected; dropping `tokens`
                        // stops the provider read loop.
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generation failed mid-stream");
                    let _ = tx.send(AnswerEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }

        let _ = tx.send(AnswerEvent::Done).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// A stream that reports a single failure and terminates. Used by
/// callers whose setup (query embedding, session lookup) failed before
/// generation could start.
pub fn error_stream(message: impl Into<String>) -> AnswerStream {
    Box::pin(tokio_stream::iter(vec![AnswerEvent::Error(message.into())]))
}
