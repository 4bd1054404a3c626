//! Streamed chat completions from an OpenAI-compatible API.
//!
//! `stream_chat` resolves once the upstream has accepted the request (status
//! line received). The returned stream then yields the text of each delta as
//! it arrives; nothing is accumulated.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::models::ChatMessage;
use crate::sse::SseDecoder;

/// Text fragments in the order the model produced them.
pub type CompletionStream = BoxStream<'static, Result<String, CompletionError>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(&self, messages: &[ChatMessage])
        -> Result<CompletionStream, CompletionError>;

    fn model(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("completion stream reported an error: {0}")]
    Stream(String),

    #[error("malformed completion chunk: {0}")]
    Malformed(String),

    #[error("completion service timed out waiting for {phase} after {seconds}s")]
    Timeout { phase: &'static str, seconds: u64 },

    #[error("Missing API key")]
    MissingApiKey,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChatChoiceDelta>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceDelta {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Fragment(String),
    Done,
}

fn parse_event(data: &str) -> Result<Option<StreamEvent>, CompletionError> {
    if data.trim() == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }

    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(CompletionError::Stream(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map(StreamEvent::Fragment))
}

struct FragmentState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    idle_timeout: Duration,
    eof: bool,
    done: bool,
}

fn fragments(state: FragmentState) -> CompletionStream {
    stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }

            if let Some(data) = st.pending.pop_front() {
                match parse_event(&data) {
                    Ok(Some(StreamEvent::Fragment(text))) => return Some((Ok(text), st)),
                    Ok(Some(StreamEvent::Done)) => return None,
                    Ok(None) => continue,
                    Err(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }

            if st.eof {
                return None;
            }

            match tokio::time::timeout(st.idle_timeout, st.body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let events = st.decoder.push(&chunk);
                    st.pending.extend(events);
                }
                Ok(Some(Err(e))) => {
                    st.done = true;
                    return Some((Err(CompletionError::Http(e)), st));
                }
                Ok(None) => {
                    st.eof = true;
                    st.pending.extend(st.decoder.finish());
                }
                Err(_) => {
                    st.done = true;
                    let seconds = st.idle_timeout.as_secs();
                    return Some((
                        Err(CompletionError::Timeout {
                            phase: "next fragment",
                            seconds,
                        }),
                        st,
                    ));
                }
            }
        }
    })
    .boxed()
}

/// Chat-completions client. Built once at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    response_timeout: Duration,
    idle_timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let api_key = config.resolved_api_key();
        if api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        // No overall request timeout: a streamed answer may legitimately run
        // for minutes. Silence is bounded by `idle_timeout` instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            response_timeout: Duration::from_secs(config.response_timeout_seconds),
            idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletionClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&request)
            .send();

        let response = tokio::time::timeout(self.response_timeout, send)
            .await
            .map_err(|_| CompletionError::Timeout {
                phase: "response",
                seconds: self.response_timeout.as_secs(),
            })??;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Completion service error");
            return Err(CompletionError::Service {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "Completion stream opened");

        Ok(fragments(FragmentState {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout: self.idle_timeout,
            eof: false,
            done: false,
        }))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
