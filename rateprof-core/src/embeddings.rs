//! Embedding stage: turns the latest user message into a query vector.
//!
//! The production backend is a small HTTP service that accepts `{"text": ...}`
//! and answers with a JSON object holding the vector under a configurable
//! field name.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio_retry::RetryIf;

use crate::config::{EmbeddingConfig, RetryConfig};
use crate::retry::{backoff, is_retryable_status};

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("malformed embedding response: {0}")]
    Format(String),

    #[error("expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// `true` for service-side failures (transport or non-success status).
    pub fn is_service_error(&self) -> bool {
        matches!(self, EmbeddingError::Http(_) | EmbeddingError::Service { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Http(_) => true,
            EmbeddingError::Service { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

/// Pull a numeric vector out of `body[field]`.
pub fn extract_vector(body: &serde_json::Value, field: &str) -> Result<Vec<f32>, EmbeddingError> {
    let values = body
        .get(field)
        .ok_or_else(|| EmbeddingError::Format(format!("missing field `{}`", field)))?
        .as_array()
        .ok_or_else(|| EmbeddingError::Format(format!("field `{}` is not an array", field)))?;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                EmbeddingError::Format(format!("element {} of `{}` is not a number", i, field))
            })
        })
        .collect()
}

/// HTTP embedding client with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    url: String,
    response_field: String,
    dimensions: Option<usize>,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig, retry: &RetryConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            response_field: config.response_field.clone(),
            dimensions: config.dimensions,
            api_key: config.resolved_api_key(),
            retry: retry.clone(),
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut request = self.client.post(&self.url).json(&EmbedRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "Embedding request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), message = %message, "Embedding service error");
            return Err(EmbeddingError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| EmbeddingError::Format(format!("invalid JSON: {}", e)))?;

        let vector = extract_vector(&body, &self.response_field)?;

        if let Some(expected) = self.dimensions {
            if vector.len() != expected {
                return Err(EmbeddingError::InvalidDimensions {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let result = RetryIf::start(
            backoff(&self.retry),
            || self.embed_once(text),
            EmbeddingError::is_retryable,
        )
        .await;

        if let Err(e) = &result {
            tracing::error!(
                max_retries = self.retry.max_retries,
                error = %e,
                "Embedding failed"
            );
        }
        result
    }

    fn name(&self) -> &str {
        "http"
    }
}
