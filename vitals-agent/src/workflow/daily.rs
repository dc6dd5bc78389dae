//! Daily wellness workflow
//!
//! `fetch_latest -> compose_summary -> sms_summary -> END`, halting with a
//! no-op when no daily summary has been received yet.

use futures::future::BoxFuture;
use tracing::{error, info};
use vitals_common::WellnessSummary;

use super::graph::{RunInfo, StepOutcome, StepResult, WorkflowGraph, WorkflowState, END};
use super::{TerminalStatus, WorkflowContext, WorkflowError};
use crate::narrative::MessageRequest;
use crate::sink::Channel;

pub const NAME: &str = "daily_wellness";

#[derive(Debug, Clone, Default)]
pub struct DailyState {
    pub summary: Option<WellnessSummary>,
    pub message: Option<String>,
    pub sent: bool,
}

impl WorkflowState for DailyState {
    fn terminal_status(&self) -> TerminalStatus {
        if self.sent {
            TerminalStatus::Dispatched { channel: Channel::Sms }
        } else {
            TerminalStatus::no_op("daily summary not sent")
        }
    }
}

fn fetch_latest<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut DailyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let latest = ctx.store.latest_summary().await.unwrap_or_else(|e| {
            error!("Failed to fetch latest summary, treating as no data: {}", e);
            None
        });

        match latest {
            Some(summary) => {
                info!(summary_at = %summary.timestamp, "Latest daily summary found");
                state.summary = Some(summary);
                Ok(StepOutcome::Continue)
            }
            None => Ok(StepOutcome::Halt(TerminalStatus::no_op("no daily summary recorded"))),
        }
    })
}

fn compose_summary<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut DailyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let Some(summary) = state.summary.clone() else {
            return Err(WorkflowError::Graph("compose_summary reached without data".to_string()));
        };
        state.message = Some(ctx.compose(&MessageRequest::DailyWellness { summary }).await?);
        Ok(StepOutcome::Continue)
    })
}

fn sms_summary<'a>(
    ctx: &'a WorkflowContext,
    run: &'a RunInfo,
    state: &'a mut DailyState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        if let Some(message) = &state.message {
            ctx.deliver(run, Channel::Sms, message, None).await?;
            state.sent = true;
        }
        Ok(StepOutcome::Continue)
    })
}

pub fn graph() -> Result<WorkflowGraph<DailyState>, WorkflowError> {
    WorkflowGraph::new(NAME, "fetch_latest")
        .step("fetch_latest", fetch_latest)
        .step("compose_summary", compose_summary)
        .step("sms_summary", sms_summary)
        .edge("fetch_latest", "compose_summary")
        .edge("compose_summary", "sms_summary")
        .edge("sms_summary", END)
        .validate()
}
