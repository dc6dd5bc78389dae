//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while the worker queue is full
    pub status: String,
    /// Module name ("vitals-agent")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Telemetry store backend ("sqlite" or "memory")
    pub store: String,
    pub workers: WorkerStats,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkerStats {
    pub size: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub completed: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let pool = state.dispatcher.pool();
    let workers = WorkerStats {
        size: pool.size(),
        queue_capacity: pool.capacity(),
        queued: pool.queued(),
        completed: pool.completed(),
    };
    let status = if workers.queued >= workers.queue_capacity {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: crate::config::MODULE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        store: state.dispatcher.workflows().context().store.backend().to_string(),
        workers,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
