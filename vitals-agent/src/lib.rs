//! vitals-agent library interface
//!
//! Exposes the alerting core (classifier, cooldown gate, aggregator,
//! workflows) and the service plumbing around it for integration testing.

pub mod aggregator;
pub mod api;
pub mod classifier;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod narrative;
pub mod pool;
pub mod scheduler;
pub mod sink;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vitals_common::EventBus;

use crate::dispatcher::Dispatcher;

/// Build identification captured by build.rs
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let event_bus = dispatcher.workflows().context().events.clone();
        Self {
            dispatcher,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::event_routes())
        .route("/events/stream", get(api::event_stream))
        .merge(api::workflow_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
