//! Monitor event bus
//!
//! Broadcasts what the agent decided and did (accepted payloads, suppressed
//! alerts, sent notifications, workflow terminal statuses) to any interested
//! component: the SSE stream, tests, future dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::NotificationKind;

/// Monitor event types
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag for
/// SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonitorEvent {
    /// A realtime reading passed validation and was queued
    ReadingAccepted {
        heart_rate: i64,
        spo2: i64,
        stress_level: i64,
        timestamp: DateTime<Utc>,
    },

    /// A daily summary passed validation and was queued
    SummaryAccepted { timestamp: DateTime<Utc> },

    /// An inbound payload failed validation and was dropped
    PayloadRejected {
        /// Inbound event name (`realtimeData`, `dailyData`)
        event: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Advisory event observed but not acted on (`overrideSet`, `overrideCleared`)
    AdvisoryReceived {
        event: String,
        timestamp: DateTime<Utc>,
    },

    /// Cooldown gate refused a notification; decision demoted to normal
    AlertSuppressed {
        kind: NotificationKind,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Dispatch sink acknowledged a message
    NotificationSent {
        /// Present when the notification is cooldown-tracked
        kind: Option<NotificationKind>,
        /// `sms` or `call`
        channel: String,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A workflow run reached its terminal state
    WorkflowFinished {
        workflow: String,
        run_id: Uuid,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// The worker pool refused a job (queue full or shutting down)
    JobRejected {
        job: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// SSE event name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::ReadingAccepted { .. } => "ReadingAccepted",
            MonitorEvent::SummaryAccepted { .. } => "SummaryAccepted",
            MonitorEvent::PayloadRejected { .. } => "PayloadRejected",
            MonitorEvent::AdvisoryReceived { .. } => "AdvisoryReceived",
            MonitorEvent::AlertSuppressed { .. } => "AlertSuppressed",
            MonitorEvent::NotificationSent { .. } => "NotificationSent",
            MonitorEvent::WorkflowFinished { .. } => "WorkflowFinished",
            MonitorEvent::JobRejected { .. } => "JobRejected",
        }
    }
}

/// Broadcast channel for [`MonitorEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity` is
    /// exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
