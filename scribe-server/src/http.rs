//! Scribe HTTP API
//!
//! Small axum server for triggering capture processing and checking liveness.
//! Each endpoint is a thin handler over an inner function that can be called
//! directly in tests.
//!
//! Endpoints:
//! - GET  /health                 health check with DB status
//! - GET  /version                server version info
//! - POST /captures/:id/process   queue a first attempt for a capture

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use scribe_core::ScribeConfig;
use serde::Serialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::subsystems::runner::Invocation;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: PgPool,
    pub config: ScribeConfig,
    pub queue: mpsc::Sender<Invocation>,
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/captures/:id/process", post(process_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: PgPool,
    config: ScribeConfig,
    queue: mpsc::Sender<Invocation>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState {
        pool,
        config,
        queue,
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Scribe HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!({ "error": self.error, "status": self.status })
    }
}

// ============================================================================
// Inner functions
// ============================================================================

pub async fn health_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    match scribe_core::db::health_check(pool).await {
        Ok(pg_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "postgresql": pg_ver,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "scribe",
        "protocol": "scribe/1",
    })
}

/// Queue a first attempt. Processing happens on the worker; the response only
/// confirms the capture was accepted.
pub fn process_inner(
    queue: &mpsc::Sender<Invocation>,
    raw_id: &str,
) -> (StatusCode, serde_json::Value) {
    let capture_id = match Uuid::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(format!("invalid capture id: {}", raw_id)).into_value(),
            );
        }
    };

    match queue.try_send(Invocation::first(capture_id)) {
        Ok(()) => {
            tracing::info!(capture_id = %capture_id, "Capture queued via HTTP");
            (
                StatusCode::ACCEPTED,
                serde_json::json!({ "queued": true, "id": capture_id }),
            )
        }
        Err(mpsc::error::TrySendError::Full(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new("invocation queue full").into_value(),
        ),
        Err(mpsc::error::TrySendError::Closed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new("worker not running").into_value(),
        ),
    }
}

// ============================================================================
// Axum handlers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn process_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = process_inner(&state.queue, &id);
    (status, Json(body))
}
