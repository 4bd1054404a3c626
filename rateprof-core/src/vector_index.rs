//! Similarity retrieval against a Pinecone-compatible vector index.
//!
//! Query results are returned in the index's own relevance order and are
//! never re-sorted here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_retry::RetryIf;

use crate::config::{RetryConfig, VectorIndexConfig};
use crate::models::RetrievalMatch;
use crate::retry::{backoff, is_retryable_status};

/// Number of professors pulled into every prompt.
pub const TOP_K: usize = 3;

const API_VERSION: &str = "2024-07";

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `vector`, at most `top_k`, best first.
    async fn query(&self, vector: &[f32], top_k: usize)
        -> Result<Vec<RetrievalMatch>, RetrievalError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector index returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("malformed vector index response: {0}")]
    Malformed(String),

    #[error("Missing API key")]
    MissingApiKey,
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::Http(_) => true,
            RetrievalError::Service { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RetrievalMatch>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Pinecone data-plane client bound to one index and namespace.
#[derive(Debug)]
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    index: String,
    namespace: String,
    controller_url: String,
    host: OnceCell<String>,
    retry: RetryConfig,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig, retry: &RetryConfig) -> Result<Self, RetrievalError> {
        let api_key = config.resolved_api_key();
        if api_key.is_empty() {
            return Err(RetrievalError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            index: config.index.clone(),
            namespace: config.namespace.clone(),
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            host: OnceCell::new_with(config.host.as_deref().map(normalize_host)),
            retry: retry.clone(),
        })
    }

    /// Data-plane URL, looked up from the control plane on first use.
    pub async fn host(&self) -> Result<&str, RetrievalError> {
        self.host
            .get_or_try_init(|| self.describe_index())
            .await
            .map(String::as_str)
    }

    async fn describe_index(&self) -> Result<String, RetrievalError> {
        let url = format!("{}/indexes/{}", self.controller_url, self.index);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let description: IndexDescription = response
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(format!("index description: {}", e)))?;

        let host = normalize_host(&description.host);
        tracing::info!(index = %self.index, host = %host, "Resolved vector index host");
        Ok(host)
    }

    async fn query_once(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
        let url = format!("{}/query", self.host().await?);
        let request = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), message = %message, "Vector index error");
            return Err(RetrievalError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: QueryResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        let mut matches = parsed.matches;
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
        let result = RetryIf::start(
            backoff(&self.retry),
            || self.query_once(vector, top_k),
            RetrievalError::is_retryable,
        )
        .await;

        match &result {
            Ok(matches) => {
                tracing::debug!(count = matches.len(), namespace = %self.namespace, "Vector index query done")
            }
            Err(e) => tracing::error!(error = %e, index = %self.index, "Vector index query failed"),
        }
        result
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
