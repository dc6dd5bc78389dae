//! Emergency workflow
//!
//! ```text
//! take_data -> classify -+- normal -----> END
//!                        +- high_alert -> emergency_call -> END
//!                        +- low_alert --> compose_alert -> sms_alert -> END
//! ```
//!
//! Both alert steps hold the cooldown lease for their kind across check,
//! dispatch and record. A refused check demotes the decision to normal.

use futures::future::BoxFuture;
use tracing::{debug, error, info};
use vitals_common::{NotificationKind, VitalSigns};

use super::graph::{RunInfo, StepOutcome, StepResult, WorkflowGraph, WorkflowState, END};
use super::{TerminalStatus, WorkflowContext, WorkflowError};
use crate::aggregator::{aggregate, Lookback, WindowAggregate};
use crate::classifier::{classify, Classification, Severity};
use crate::narrative::MessageRequest;
use crate::sink::Channel;

pub const NAME: &str = "emergency";

#[derive(Debug, Clone)]
pub struct EmergencyState {
    /// The triggering reading, counters stripped
    pub vitals: VitalSigns,
    pub classification: Option<Classification>,
    /// Overall severity after any cooldown demotion
    pub decision: Option<Severity>,
    /// Trailing averages; `None` when there was no recent data
    pub context: Option<WindowAggregate>,
    pub message: Option<String>,
    pub suppressed: Option<NotificationKind>,
    pub alert_sent: Option<Channel>,
}

impl EmergencyState {
    pub fn new(vitals: VitalSigns) -> Self {
        Self {
            vitals,
            classification: None,
            decision: None,
            context: None,
            message: None,
            suppressed: None,
            alert_sent: None,
        }
    }
}

impl WorkflowState for EmergencyState {
    fn terminal_status(&self) -> TerminalStatus {
        match (&self.alert_sent, &self.suppressed) {
            (Some(channel), _) => TerminalStatus::Dispatched { channel: *channel },
            (None, Some(kind)) => TerminalStatus::CooledDown { kind: kind.clone() },
            (None, None) => TerminalStatus::Normal,
        }
    }
}

fn take_data<'a>(
    _ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut EmergencyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        debug!(
            heart_rate = state.vitals.heart_rate,
            spo2 = state.vitals.spo2,
            stress_level = state.vitals.stress_level,
            "Reading received"
        );
        Ok(StepOutcome::Continue)
    })
}

fn classify_reading<'a>(
    _ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut EmergencyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let classification = classify(&state.vitals);
        info!(
            heart_rate = %classification.heart_rate,
            spo2 = %classification.spo2,
            stress_level = %classification.stress_level,
            overall = %classification.overall,
            "Reading classified"
        );
        state.classification = Some(classification);
        state.decision = Some(classification.overall);
        Ok(StepOutcome::Continue)
    })
}

fn emergency_message(vitals: &VitalSigns) -> String {
    format!(
        "Emergency alert from your health monitor. Heart rate {} beats per minute, \
         oxygen saturation {} percent, stress level {}. Please respond or seek help now.",
        vitals.heart_rate, vitals.spo2, vitals.stress_level
    )
}

/// Check the gate, send, then record, all under the kind's lease
async fn gated_send(
    ctx: &WorkflowContext,
    run: &RunInfo,
    state: &mut EmergencyState,
    kind: NotificationKind,
    channel: Channel,
    message: &str,
) -> StepResult {
    let lease = ctx.cooldown.lease(&kind).await;

    if !lease.allowed().await {
        state.decision = Some(Severity::Normal);
        state.suppressed = Some(kind.clone());
        ctx.suppressed(run, &kind);
        return Ok(StepOutcome::Halt(TerminalStatus::CooledDown { kind }));
    }

    ctx.deliver(run, channel, message, Some(&kind))
        .await
        .map_err(WorkflowError::Dispatch)?;
    state.alert_sent = Some(channel);

    if let Err(e) = lease.record().await {
        // Delivered but not recorded: the next alert of this kind will not be suppressed
        error!(kind = %kind, "Failed to record notification occurrence: {}", e);
    }

    Ok(StepOutcome::Continue)
}

fn emergency_call<'a>(
    ctx: &'a WorkflowContext,
    run: &'a RunInfo,
    state: &'a mut EmergencyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let message = emergency_message(&state.vitals);
        gated_send(ctx, run, state, NotificationKind::EmergencyCall, Channel::Call, &message).await
    })
}

fn compose_alert<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut EmergencyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let minutes = ctx.settings.emergency_context_minutes;
        let recent = ctx.recent_readings(Lookback::minutes(minutes)).await;
        state.context = aggregate(&recent);

        if state.context.is_none() {
            debug!("No readings in the last {} minutes; narrating without averages", minutes);
        }

        let Some(classification) = state.classification else {
            return Err(WorkflowError::Graph("compose_alert reached before classify".to_string()));
        };

        let request = MessageRequest::EmergencyAlert {
            vitals: state.vitals,
            classification,
            context_minutes: minutes,
            context: state.context.clone(),
        };
        state.message = Some(ctx.compose(&request).await?);
        Ok(StepOutcome::Continue)
    })
}

fn sms_alert<'a>(
    ctx: &'a WorkflowContext,
    run: &'a RunInfo,
    state: &'a mut EmergencyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let Some(message) = state.message.clone() else {
            return Ok(StepOutcome::Halt(TerminalStatus::no_op("no alert message composed")));
        };
        gated_send(ctx, run, state, NotificationKind::EmergencySms, Channel::Sms, &message).await
    })
}

fn is_normal(state: &EmergencyState) -> bool {
    state.decision == Some(Severity::Normal)
}

fn is_high_alert(state: &EmergencyState) -> bool {
    state.decision == Some(Severity::HighAlert)
}

fn is_low_alert(state: &EmergencyState) -> bool {
    state.decision == Some(Severity::LowAlert)
}

pub fn graph() -> Result<WorkflowGraph<EmergencyState>, WorkflowError> {
    WorkflowGraph::new(NAME, "take_data")
        .step("take_data", take_data)
        .step("classify", classify_reading)
        .step("emergency_call", emergency_call)
        .step("compose_alert", compose_alert)
        .step("sms_alert", sms_alert)
        .edge("take_data", "classify")
        .edge_if("classify", is_normal, END)
        .edge_if("classify", is_high_alert, "emergency_call")
        .edge_if("classify", is_low_alert, "compose_alert")
        .edge("emergency_call", END)
        .edge("compose_alert", "sms_alert")
        .edge("sms_alert", END)
        .validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::NarrativeError;
    use crate::workflow::test_context;
    use chrono::Duration;
    use vitals_common::db::TelemetryStore;
    use vitals_common::{Clock, MonitorEvent, Reading};

    fn vitals(ctx: &WorkflowContext, heart_rate: i64, spo2: i64, stress_level: i64) -> VitalSigns {
        VitalSigns {
            heart_rate,
            spo2,
            stress_level,
            timestamp: ctx.now(),
        }
    }

    #[tokio::test]
    async fn test_normal_reading_ends_without_side_effects() {
        let (ctx, handles) = test_context();
        let graph = graph().unwrap();

        let report = graph.run(&ctx, EmergencyState::new(vitals(&ctx, 72, 98, 10))).await;

        assert_eq!(report.status, TerminalStatus::Normal);
        assert_eq!(report.path, vec!["take_data", "classify"]);
        assert_eq!(handles.sink.attempts(), 0);
        assert_eq!(handles.narrator.compose_calls(), 0);
    }

    #[tokio::test]
    async fn test_high_alert_calls_then_cools_down() {
        let (ctx, handles) = test_context();
        let graph = graph().unwrap();

        let first = graph.run(&ctx, EmergencyState::new(vitals(&ctx, 130, 98, 10))).await;
        assert_eq!(first.status, TerminalStatus::Dispatched { channel: Channel::Call });
        assert_eq!(first.path, vec!["take_data", "classify", "emergency_call"]);
        assert_eq!(handles.sink.sent_on(Channel::Call), 1);
        assert_eq!(handles.store.notification_count().await, 1);

        handles.clock.advance(Duration::minutes(5));
        let mut events = ctx.events.subscribe();
        let second = graph.run(&ctx, EmergencyState::new(vitals(&ctx, 130, 98, 10))).await;

        assert_eq!(
            second.status,
            TerminalStatus::CooledDown {
                kind: NotificationKind::EmergencyCall
            }
        );
        assert_eq!(second.state.decision, Some(Severity::Normal));
        assert_eq!(handles.sink.sent_on(Channel::Call), 1);
        assert_eq!(handles.store.notification_count().await, 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::AlertSuppressed { kind: NotificationKind::EmergencyCall, .. }
        ));
    }

    #[tokio::test]
    async fn test_low_alert_narrates_with_context_and_texts() {
        let (ctx, handles) = test_context();
        let now = handles.clock.now();
        for (minutes_ago, hr) in [(4, 90), (2, 100)] {
            handles
                .store
                .insert_reading(&Reading {
                    heart_rate: hr,
                    spo2: 97,
                    stress_level: 20,
                    steps: 1000,
                    calories_burned: 40,
                    timestamp: now - Duration::minutes(minutes_ago),
                })
                .await
                .unwrap();
        }
        handles.narrator.push_message(Ok("Your heart rate is a bit high. Rest a few minutes.".to_string()));

        let report = graph()
            .unwrap()
            .run(&ctx, EmergencyState::new(vitals(&ctx, 105, 98, 20)))
            .await;

        assert_eq!(report.status, TerminalStatus::Dispatched { channel: Channel::Sms });
        assert_eq!(report.path, vec!["take_data", "classify", "compose_alert", "sms_alert"]);
        let context = report.state.context.unwrap();
        assert_eq!(context.record_count, 2);
        assert_eq!(context.avg_heart_rate, 95.0);

        let sent = handles.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "Your heart rate is a bit high. Rest a few minutes.");
        let occurrence = handles
            .store
            .latest_notification(&NotificationKind::EmergencySms)
            .await
            .unwrap();
        assert!(occurrence.is_some());
    }

    #[tokio::test]
    async fn test_low_alert_without_history_still_alerts() {
        let (ctx, handles) = test_context();
        let report = graph()
            .unwrap()
            .run(&ctx, EmergencyState::new(vitals(&ctx, 98, 93, 20)))
            .await;

        assert_eq!(report.status, TerminalStatus::Dispatched { channel: Channel::Sms });
        assert!(report.state.context.is_none());
        match &handles.narrator.requests()[0] {
            MessageRequest::EmergencyAlert { context, .. } => assert!(context.is_none()),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generation_failure_sends_nothing() {
        let (ctx, handles) = test_context();
        handles.narrator.push_message(Err(NarrativeError::Malformed("not json".to_string())));

        let report = graph()
            .unwrap()
            .run(&ctx, EmergencyState::new(vitals(&ctx, 105, 98, 20)))
            .await;

        assert_eq!(report.status, TerminalStatus::GenerationFailed);
        assert_eq!(handles.sink.attempts(), 0);
        assert_eq!(handles.store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_leaves_cooldown_open() {
        let (ctx, handles) = test_context();
        handles.sink.set_failing(true);

        let report = graph()
            .unwrap()
            .run(&ctx, EmergencyState::new(vitals(&ctx, 140, 98, 10)))
            .await;
        assert_eq!(report.status, TerminalStatus::DispatchFailed);
        assert_eq!(handles.store.notification_count().await, 0);

        handles.sink.set_failing(false);
        let retry = graph()
            .unwrap()
            .run(&ctx, EmergencyState::new(vitals(&ctx, 140, 98, 10)))
            .await;
        assert_eq!(retry.status, TerminalStatus::Dispatched { channel: Channel::Call });
    }

    #[tokio::test]
    async fn test_sms_and_call_cooldowns_are_independent() {
        let (ctx, handles) = test_context();
        let graph = graph().unwrap();

        graph.run(&ctx, EmergencyState::new(vitals(&ctx, 130, 98, 10))).await;
        let sms = graph.run(&ctx, EmergencyState::new(vitals(&ctx, 105, 98, 10))).await;

        assert_eq!(sms.status, TerminalStatus::Dispatched { channel: Channel::Sms });
        assert_eq!(handles.sink.sent_on(Channel::Call), 1);
        assert_eq!(handles.sink.sent_on(Channel::Sms), 1);
    }
}
