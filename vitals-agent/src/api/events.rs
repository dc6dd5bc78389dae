//! Event ingestion endpoint

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatcher::{Admission, InboundEvent};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Inbound envelope: `{ "event": "realtimeData", "data": { ... } }`
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub status: &'static str,
    pub event: String,
}

/// POST /events
///
/// 202 once the payload is validated and its workflow queued; 422 when
/// validation fails; 503 when the worker queue is full.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> ApiResult<(StatusCode, Json<EventAccepted>)> {
    let Some(event) = InboundEvent::parse(&envelope.event) else {
        warn!(event = %envelope.event, "Unknown inbound event");
        return Err(ApiError::BadRequest(format!("unknown event '{}'", envelope.event)));
    };

    debug!(event = %event, "Inbound event");
    match state.dispatcher.handle(event, &envelope.data).await {
        Admission::Accepted => Ok((
            StatusCode::ACCEPTED,
            Json(EventAccepted {
                status: "accepted",
                event: envelope.event,
            }),
        )),
        Admission::Rejected(reason) => Err(ApiError::Unprocessable(reason)),
        Admission::Overloaded => {
            let message = format!("{} accepted but its workflow could not be queued", event);
            state.record_error(&message).await;
            Err(ApiError::Overloaded(message))
        }
    }
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", post(ingest_event))
}
