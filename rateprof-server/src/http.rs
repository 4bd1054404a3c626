//! Rateprof HTTP API
//!
//! Axum-based HTTP server exposing the professor-recommendation chat.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function taking plain arguments, so the inner functions can be tested
//! without going through the router.
//!
//! Endpoints:
//! - POST /api/chat: conversation in, streamed assistant reply out
//! - GET  /health: liveness plus the configured upstream names
//! - GET  /version: server version info

use std::sync::Arc;

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rateprof_core::RagError;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::pipeline;
use crate::state::AppState;
use crate::subsystems::relay;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(state)
}

/// Serve on the configured address until the shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Rateprof HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
    pub stage: String,
}

impl ErrorResponse {
    pub fn from_error(e: &RagError) -> Self {
        Self {
            error: e.to_string(),
            status: "error".to_string(),
            stage: e.stage().to_string(),
        }
    }
}

/// 400 for bad input, 502 when an upstream service let us down.
pub fn status_for(e: &RagError) -> StatusCode {
    match e {
        RagError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        RagError::Embedding(_) | RagError::Retrieval(_) | RagError::Completion(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Inner chat: run the pipeline and either stream the reply or report the
/// failing stage. All work for one request, including the relay task, runs
/// in a span carrying its request id.
pub async fn chat_inner(state: &AppState, body: &[u8]) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    async move {
        match pipeline::prepare_reply(state, body).await {
            Ok(upstream) => {
                let (stream, _pump) = relay::spawn_relay(upstream);
                let mut response =
                    (StatusCode::OK, Body::from_stream(stream)).into_response();
                let headers = response.headers_mut();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                    headers.insert("x-request-id", value);
                }
                response
            }
            Err(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::error!(stage = e.stage(), error = %e, "Chat request failed");
                } else {
                    tracing::warn!(stage = e.stage(), error = %e, "Chat request rejected");
                }
                (status, Json(ErrorResponse::from_error(&e))).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

pub fn health_inner(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "embedder": state.embedder.name(),
        "index": state.config.vector_index.index,
        "namespace": state.config.vector_index.namespace,
        "model": state.completion.model(),
    })
}

/// Inner version: pure, no IO.
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "rateprof/1",
    })
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    chat_inner(&state, &body).await
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner(&state)))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}
