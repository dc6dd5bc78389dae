//! Server-Sent Events stream of monitor events

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// GET /events/stream
///
/// Streams every [`vitals_common::MonitorEvent`]: accepted and rejected
/// payloads, suppressed alerts, sent notifications, workflow outcomes.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to monitor events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(event) => {
                        let event_type = event.event_type();
                        match serde_json::to_string(&event) {
                            Ok(json) => yield Ok(Event::default().event(event_type).data(json)),
                            Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE client lagging; events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("SSE: Event bus closed");
                        break;
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
