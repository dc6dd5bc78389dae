//! Workflow engine
//!
//! Four decision graphs, one per monitoring cadence:
//! - **emergency**: per incoming reading; classify, branch on severity,
//!   gate through the cooldown, then call or text
//! - **periodic_wellness**: trailing hours aggregate narrated as an
//!   encouraging SMS
//! - **daily_wellness**: latest daily summary narrated as an SMS
//! - **trend_analysis**: long-horizon weekly aggregates, model prediction,
//!   SMS only for a warranted prediction with a non-blank message
//!
//! Collaborators (store, narrator, sink, clock, event bus) are injected once
//! through [`WorkflowContext`]. Every run ends in an explicit
//! [`TerminalStatus`].

pub mod daily;
pub mod emergency;
pub mod graph;
pub mod periodic;
pub mod trend;

pub use graph::{RunInfo, RunReport, StepOutcome, WorkflowGraph, WorkflowState, END};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use vitals_common::config::TomlConfig;
use vitals_common::db::TelemetryStore;
use vitals_common::{Clock, EventBus, MonitorEvent, NotificationKind, Reading, VitalSigns, WellnessSummary};

use crate::aggregator::Lookback;
use crate::cooldown::CooldownGate;
use crate::narrative::{MessageRequest, NarrativeError, NarrativeGenerator, TrendAnalysis, TrendRequest};
use crate::sink::{Channel, DispatchError, DispatchSink};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow graph error: {0}")]
    Graph(String),

    #[error("Store error: {0}")]
    Store(#[from] vitals_common::Error),

    #[error(transparent)]
    Narrative(#[from] NarrativeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl WorkflowError {
    pub fn terminal_status(&self) -> TerminalStatus {
        match self {
            WorkflowError::Narrative(_) => TerminalStatus::GenerationFailed,
            WorkflowError::Dispatch(_) => TerminalStatus::DispatchFailed,
            WorkflowError::Graph(_) | WorkflowError::Store(_) => TerminalStatus::Failed,
        }
    }
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Nothing warranted a notification
    Normal,
    /// An escalation was suppressed by the cooldown gate
    CooledDown { kind: NotificationKind },
    /// Not enough data (or no usable message) to act on
    NoOp { reason: String },
    /// The sink acknowledged a notification
    Dispatched { channel: Channel },
    /// Narrative generation failed or timed out; nothing was sent
    GenerationFailed,
    /// The sink failed; nothing is recorded
    DispatchFailed,
    /// Graph or store failure
    Failed,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Normal => "normal",
            TerminalStatus::CooledDown { .. } => "cooled_down",
            TerminalStatus::NoOp { .. } => "no_op",
            TerminalStatus::Dispatched { .. } => "dispatched",
            TerminalStatus::GenerationFailed => "generation_failed",
            TerminalStatus::DispatchFailed => "dispatch_failed",
            TerminalStatus::Failed => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TerminalStatus::GenerationFailed | TerminalStatus::DispatchFailed | TerminalStatus::Failed
        )
    }

    pub fn no_op(reason: impl Into<String>) -> Self {
        TerminalStatus::NoOp {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::CooledDown { kind } => write!(f, "cooled_down({})", kind),
            TerminalStatus::NoOp { reason } => write!(f, "no_op({})", reason),
            TerminalStatus::Dispatched { channel } => write!(f, "dispatched({})", channel),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Windows and limits used by the graphs
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub emergency_context_minutes: u64,
    pub periodic_hours: u64,
    pub trend_days: u64,
    pub narrative_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            emergency_context_minutes: config.windows.emergency_context_minutes,
            periodic_hours: config.windows.periodic_hours,
            trend_days: config.windows.trend_days,
            narrative_timeout: Duration::from_secs(config.narrative.timeout_seconds),
        }
    }
}

/// Collaborators shared by every run
pub struct WorkflowContext {
    pub store: Arc<dyn TelemetryStore>,
    pub narrator: Arc<dyn NarrativeGenerator>,
    pub sink: Arc<dyn DispatchSink>,
    pub cooldown: CooldownGate,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub settings: WorkflowSettings,
}

impl WorkflowContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Readings inside the trailing window; a store failure reads as empty
    pub async fn recent_readings(&self, window: Lookback) -> Vec<Reading> {
        let (start, end) = window.bounds(self.now());
        match self.store.readings_in_range(start, end).await {
            Ok(readings) => readings,
            Err(e) => {
                error!("Failed to query readings, treating as no data: {}", e);
                Vec::new()
            }
        }
    }

    /// Summaries inside the trailing window; a store failure reads as empty
    pub async fn recent_summaries(&self, window: Lookback) -> Vec<WellnessSummary> {
        let (start, end) = window.bounds(self.now());
        match self.store.summaries_in_range(start, end).await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!("Failed to query summaries, treating as no data: {}", e);
                Vec::new()
            }
        }
    }

    /// Generate an SMS body, bounded by the narrative timeout
    ///
    /// Output is trimmed; a blank message is `EmptyMessage` whichever
    /// generator produced it.
    pub async fn compose(&self, request: &MessageRequest) -> Result<String, NarrativeError> {
        let timeout = self.settings.narrative_timeout;
        let message = tokio::time::timeout(timeout, self.narrator.compose_message(request))
            .await
            .map_err(|_| NarrativeError::Timeout(timeout.as_secs()))??;

        let message = message.trim();
        if message.is_empty() {
            return Err(NarrativeError::EmptyMessage);
        }
        Ok(message.to_string())
    }

    /// Run trend analysis, bounded by the narrative timeout
    pub async fn analyze(&self, request: &TrendRequest) -> Result<TrendAnalysis, NarrativeError> {
        let timeout = self.settings.narrative_timeout;
        tokio::time::timeout(timeout, self.narrator.analyze_trends(request))
            .await
            .map_err(|_| NarrativeError::Timeout(timeout.as_secs()))?
    }

    /// Deliver one message and announce it on the event bus
    pub async fn deliver(
        &self,
        run: &RunInfo,
        channel: Channel,
        message: &str,
        kind: Option<&NotificationKind>,
    ) -> Result<(), DispatchError> {
        if let Err(e) = self.sink.send(channel, message).await {
            error!(channel = %channel, sink = self.sink.name(), "Dispatch failed: {}", e);
            return Err(e);
        }

        info!(channel = %channel, sink = self.sink.name(), "Notification sent");
        self.events.emit_lossy(MonitorEvent::NotificationSent {
            kind: kind.cloned(),
            channel: channel.as_str().to_string(),
            run_id: run.id,
            timestamp: self.now(),
        });
        Ok(())
    }

    /// Log and announce a cooldown suppression
    pub fn suppressed(&self, run: &RunInfo, kind: &NotificationKind) {
        warn!(kind = %kind, "Cooldown active; alert demoted to normal");
        self.events.emit_lossy(MonitorEvent::AlertSuppressed {
            kind: kind.clone(),
            run_id: run.id,
            timestamp: self.now(),
        });
    }
}

/// The four workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Emergency,
    PeriodicWellness,
    DailyWellness,
    TrendAnalysis,
}

impl WorkflowKind {
    /// Timer-driven workflows
    pub const SCHEDULED: [WorkflowKind; 3] = [
        WorkflowKind::PeriodicWellness,
        WorkflowKind::DailyWellness,
        WorkflowKind::TrendAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Emergency => emergency::NAME,
            WorkflowKind::PeriodicWellness => periodic::NAME,
            WorkflowKind::DailyWellness => daily::NAME,
            WorkflowKind::TrendAnalysis => trend::NAME,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [
            WorkflowKind::Emergency,
            WorkflowKind::PeriodicWellness,
            WorkflowKind::DailyWellness,
            WorkflowKind::TrendAnalysis,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == name)
    }

    pub fn is_scheduled(&self) -> bool {
        Self::SCHEDULED.contains(self)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated graphs plus their shared context
pub struct Workflows {
    ctx: WorkflowContext,
    emergency: WorkflowGraph<emergency::EmergencyState>,
    periodic: WorkflowGraph<periodic::PeriodicState>,
    daily: WorkflowGraph<daily::DailyState>,
    trend: WorkflowGraph<trend::TrendState>,
}

impl Workflows {
    pub fn new(ctx: WorkflowContext) -> Result<Self, WorkflowError> {
        Ok(Self {
            ctx,
            emergency: emergency::graph()?,
            periodic: periodic::graph()?,
            daily: daily::graph()?,
            trend: trend::graph()?,
        })
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    pub async fn run_emergency(&self, vitals: VitalSigns) -> RunReport<emergency::EmergencyState> {
        self.emergency
            .run(&self.ctx, emergency::EmergencyState::new(vitals))
            .await
    }

    pub async fn run_periodic(&self) -> RunReport<periodic::PeriodicState> {
        let state = periodic::PeriodicState::new(self.ctx.settings.periodic_hours);
        self.periodic.run(&self.ctx, state).await
    }

    pub async fn run_daily(&self) -> RunReport<daily::DailyState> {
        self.daily.run(&self.ctx, daily::DailyState::default()).await
    }

    pub async fn run_trend(&self) -> RunReport<trend::TrendState> {
        let state = trend::TrendState::new(self.ctx.settings.trend_days);
        self.trend.run(&self.ctx, state).await
    }

    /// Run a timer-driven workflow; `None` for the event-driven emergency graph
    pub async fn run_scheduled(&self, kind: WorkflowKind) -> Option<TerminalStatus> {
        match kind {
            WorkflowKind::Emergency => None,
            WorkflowKind::PeriodicWellness => Some(self.run_periodic().await.status),
            WorkflowKind::DailyWellness => Some(self.run_daily().await.status),
            WorkflowKind::TrendAnalysis => Some(self.run_trend().await.status),
        }
    }
}

#[cfg(test)]
pub(crate) struct TestHandles {
    pub store: Arc<vitals_common::db::MemoryStore>,
    pub narrator: Arc<crate::narrative::ScriptedNarrator>,
    pub sink: Arc<crate::sink::RecordingSink>,
    pub clock: Arc<vitals_common::ManualClock>,
}

/// Context over in-memory collaborators with a manual clock
#[cfg(test)]
pub(crate) fn test_context() -> (WorkflowContext, TestHandles) {
    use chrono::TimeZone;

    let store = Arc::new(vitals_common::db::MemoryStore::new());
    let narrator = Arc::new(crate::narrative::ScriptedNarrator::new());
    let sink = Arc::new(crate::sink::RecordingSink::new());
    let clock = Arc::new(vitals_common::ManualClock::new(
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap(),
    ));

    let ctx = WorkflowContext {
        store: store.clone(),
        narrator: narrator.clone(),
        sink: sink.clone(),
        cooldown: CooldownGate::new(store.clone(), clock.clone(), Default::default()),
        clock: clock.clone(),
        events: EventBus::new(64),
        settings: WorkflowSettings::default(),
    };

    (
        ctx,
        TestHandles {
            store,
            narrator,
            sink,
            clock,
        },
    )
}
