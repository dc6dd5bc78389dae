//! Inbound event dispatcher
//!
//! Validates each payload, persists it best-effort, and hands the matching
//! workflow to the worker pool without waiting for the run. Validation
//! failures are logged and dropped; nothing here propagates an error to the
//! ingestion path.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vitals_common::{MonitorEvent, Reading, WellnessSummary};

use crate::pool::{SubmitError, WorkerPool};
use crate::workflow::{WorkflowKind, Workflows};

/// Inbound event names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    RealtimeData,
    DailyData,
    OverrideSet,
    OverrideCleared,
}

impl InboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundEvent::RealtimeData => "realtimeData",
            InboundEvent::DailyData => "dailyData",
            InboundEvent::OverrideSet => "overrideSet",
            InboundEvent::OverrideCleared => "overrideCleared",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "realtimeData" => Some(InboundEvent::RealtimeData),
            "dailyData" => Some(InboundEvent::DailyData),
            "overrideSet" => Some(InboundEvent::OverrideSet),
            "overrideCleared" => Some(InboundEvent::OverrideCleared),
            _ => None,
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Validated and handed to the pool (advisories: acknowledged)
    Accepted,
    /// Failed validation; dropped
    Rejected(String),
    /// Validated and persisted, but the pool refused the workflow run
    Overloaded,
}

pub struct Dispatcher {
    workflows: Arc<Workflows>,
    pool: Arc<WorkerPool>,
}

impl Dispatcher {
    pub fn new(workflows: Arc<Workflows>, pool: Arc<WorkerPool>) -> Self {
        Self { workflows, pool }
    }

    pub fn workflows(&self) -> &Arc<Workflows> {
        &self.workflows
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Route one inbound event
    pub async fn handle(&self, event: InboundEvent, data: &Value) -> Admission {
        match event {
            InboundEvent::RealtimeData => self.on_reading(data).await,
            InboundEvent::DailyData => self.on_summary(data).await,
            InboundEvent::OverrideSet | InboundEvent::OverrideCleared => {
                self.on_advisory(event, data);
                Admission::Accepted
            }
        }
    }

    /// Validate and persist a realtime reading, then queue the emergency workflow
    pub async fn on_reading(&self, raw: &Value) -> Admission {
        let ctx = self.workflows.context();
        let reading = match Reading::from_payload(raw) {
            Ok(reading) => reading,
            Err(e) => return self.reject(InboundEvent::RealtimeData, e.to_string()),
        };

        debug!(
            heart_rate = reading.heart_rate,
            spo2 = reading.spo2,
            stress_level = reading.stress_level,
            "Realtime reading received"
        );
        ctx.events.emit_lossy(MonitorEvent::ReadingAccepted {
            heart_rate: reading.heart_rate,
            spo2: reading.spo2,
            stress_level: reading.stress_level,
            timestamp: reading.timestamp,
        });

        // Evaluation proceeds on the in-memory copy even if this fails
        if let Err(e) = ctx.store.insert_reading(&reading).await {
            error!("Failed to persist reading: {}", e);
        }

        let vitals = reading.vitals();
        let workflows = Arc::clone(&self.workflows);
        self.admit(WorkflowKind::Emergency, async move {
            workflows.run_emergency(vitals).await;
        })
    }

    /// Validate and persist a daily summary, then queue the daily wellness workflow
    pub async fn on_summary(&self, raw: &Value) -> Admission {
        let ctx = self.workflows.context();
        let summary = match WellnessSummary::from_payload(raw) {
            Ok(summary) => summary,
            Err(e) => return self.reject(InboundEvent::DailyData, e.to_string()),
        };

        info!(
            energy_score = summary.energy_score,
            sleep_minutes = summary.sleep.duration_minutes,
            "Daily summary received"
        );
        ctx.events.emit_lossy(MonitorEvent::SummaryAccepted {
            timestamp: summary.timestamp,
        });

        if let Err(e) = ctx.store.insert_summary(&summary).await {
            error!("Failed to persist daily summary: {}", e);
        }

        let workflows = Arc::clone(&self.workflows);
        self.admit(WorkflowKind::DailyWellness, async move {
            workflows.run_daily().await;
        })
    }

    /// Advisory events are observed and announced, never acted on
    pub fn on_advisory(&self, event: InboundEvent, data: &Value) {
        info!(event = %event, data = %data, "Advisory event received");
        let ctx = self.workflows.context();
        ctx.events.emit_lossy(MonitorEvent::AdvisoryReceived {
            event: event.as_str().to_string(),
            timestamp: ctx.now(),
        });
    }

    /// Queue a run of a timer-driven workflow
    pub fn trigger(&self, kind: WorkflowKind) -> Result<(), SubmitError> {
        let workflows = Arc::clone(&self.workflows);
        self.pool.submit(kind.as_str(), async move {
            workflows.run_scheduled(kind).await;
        })
    }

    fn admit<F>(&self, kind: WorkflowKind, run: F) -> Admission
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self.pool.submit(kind.as_str(), run) {
            Ok(()) => Admission::Accepted,
            Err(_) => Admission::Overloaded,
        }
    }

    fn reject(&self, event: InboundEvent, reason: String) -> Admission {
        warn!(event = %event, "Validation failed, payload dropped: {}", reason);
        let ctx = self.workflows.context();
        ctx.events.emit_lossy(MonitorEvent::PayloadRejected {
            event: event.as_str().to_string(),
            reason: reason.clone(),
            timestamp: ctx.now(),
        });
        Admission::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_names() {
        for event in [
            InboundEvent::RealtimeData,
            InboundEvent::DailyData,
            InboundEvent::OverrideSet,
            InboundEvent::OverrideCleared,
        ] {
            assert_eq!(InboundEvent::parse(event.as_str()), Some(event));
        }
        assert_eq!(InboundEvent::parse("weeklyData"), None);
    }
}
