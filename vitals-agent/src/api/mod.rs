//! HTTP API handlers for vitals-agent
//!
//! Ingestion over HTTP (`POST /events`), monitor events over SSE, health,
//! and manual workflow triggers.

pub mod events;
pub mod health;
pub mod sse;
pub mod workflows;

pub use events::event_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use workflows::workflow_routes;
