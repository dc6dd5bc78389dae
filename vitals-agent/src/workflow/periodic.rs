//! Periodic wellness workflow
//!
//! `aggregate_data -> compose_summary -> sms_summary -> END`, halting with a
//! no-op when the trailing window holds no readings. The cadence itself is
//! the rate limit, so there is no cooldown gate.

use futures::future::BoxFuture;
use tracing::info;

use super::graph::{RunInfo, StepOutcome, StepResult, WorkflowGraph, WorkflowState, END};
use super::{TerminalStatus, WorkflowContext, WorkflowError};
use crate::aggregator::{aggregate, Lookback, WindowAggregate};
use crate::narrative::MessageRequest;
use crate::sink::Channel;

pub const NAME: &str = "periodic_wellness";

#[derive(Debug, Clone)]
pub struct PeriodicState {
    pub window_hours: u64,
    pub aggregate: Option<WindowAggregate>,
    pub message: Option<String>,
    pub sent: bool,
}

impl PeriodicState {
    pub fn new(window_hours: u64) -> Self {
        Self {
            window_hours,
            aggregate: None,
            message: None,
            sent: false,
        }
    }
}

impl WorkflowState for PeriodicState {
    fn terminal_status(&self) -> TerminalStatus {
        if self.sent {
            TerminalStatus::Dispatched { channel: Channel::Sms }
        } else {
            TerminalStatus::no_op("periodic summary not sent")
        }
    }
}

fn aggregate_data<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut PeriodicState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let readings = ctx.recent_readings(Lookback::hours(state.window_hours)).await;
        match aggregate(&readings) {
            Some(agg) => {
                info!(records = agg.record_count, steps_delta = ?agg.steps_delta, "Aggregated trailing window");
                state.aggregate = Some(agg);
                Ok(StepOutcome::Continue)
            }
            None => Ok(StepOutcome::Halt(TerminalStatus::no_op(format!(
                "no readings in the last {} hours",
                state.window_hours
            )))),
        }
    })
}

fn compose_summary<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut PeriodicState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let Some(aggregate) = state.aggregate.clone() else {
            return Err(WorkflowError::Graph("compose_summary reached without data".to_string()));
        };
        let request = MessageRequest::PeriodicWellness {
            window_hours: state.window_hours,
            aggregate,
        };
        state.message = Some(ctx.compose(&request).await?);
        Ok(StepOutcome::Continue)
    })
}

fn sms_summary<'a>(
    ctx: &'a WorkflowContext,
    run: &'a RunInfo,
    state: &'a mut PeriodicState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        if let Some(message) = &state.message {
            ctx.deliver(run, Channel::Sms, message, None).await?;
            state.sent = true;
        }
        Ok(StepOutcome::Continue)
    })
}

pub fn graph() -> Result<WorkflowGraph<PeriodicState>, WorkflowError> {
    WorkflowGraph::new(NAME, "aggregate_data")
        .step("aggregate_data", aggregate_data)
        .step("compose_summary", compose_summary)
        .step("sms_summary", sms_summary)
        .edge("aggregate_data", "compose_summary")
        .edge("compose_summary", "sms_summary")
        .edge("sms_summary", END)
        .validate()
}
