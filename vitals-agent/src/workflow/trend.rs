//! Trend analysis workflow
//!
//! ```text
//! take_data -> compute_trends -> analyze --(normal)--------------> log_summary -> END
//!                                        --(warranted + message)-> sms_alert   -> END
//!                                        --(otherwise)-----------> END (no-op)
//! ```
//!
//! Either stream being empty over the window ends the run before the
//! narrator is consulted.

use futures::future::BoxFuture;
use tracing::info;
use vitals_common::{Reading, WellnessSummary};

use super::graph::{RunInfo, StepOutcome, StepResult, WorkflowGraph, WorkflowState, END};
use super::{TerminalStatus, WorkflowContext, WorkflowError};
use crate::aggregator::{compute_daily_trends, compute_realtime_trends, Lookback};
use crate::narrative::{Prediction, TrendAnalysis, TrendRequest};
use crate::sink::Channel;

pub const NAME: &str = "trend_analysis";

#[derive(Debug, Clone)]
pub struct TrendState {
    pub window_days: u64,
    pub readings: Vec<Reading>,
    pub summaries: Vec<WellnessSummary>,
    pub request: Option<TrendRequest>,
    pub analysis: Option<TrendAnalysis>,
    pub sent: bool,
}

impl TrendState {
    pub fn new(window_days: u64) -> Self {
        Self {
            window_days,
            readings: Vec::new(),
            summaries: Vec::new(),
            request: None,
            analysis: None,
            sent: false,
        }
    }
}

impl WorkflowState for TrendState {
    fn terminal_status(&self) -> TerminalStatus {
        match &self.analysis {
            _ if self.sent => TerminalStatus::Dispatched { channel: Channel::Sms },
            Some(analysis) if analysis.prediction == Prediction::Normal => TerminalStatus::Normal,
            Some(analysis) => TerminalStatus::no_op(format!(
                "prediction {} without a usable message",
                analysis.prediction
            )),
            None => TerminalStatus::no_op("no analysis produced"),
        }
    }
}

fn is_normal(state: &TrendState) -> bool {
    state
        .analysis
        .as_ref()
        .is_some_and(|a| a.prediction == Prediction::Normal)
}

fn should_alert(state: &TrendState) -> bool {
    state
        .analysis
        .as_ref()
        .is_some_and(|a| a.prediction.warrants_alert() && a.alert_message().is_some())
}

fn take_data<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut TrendState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let window = Lookback::days(state.window_days);
        state.readings = ctx.recent_readings(window).await;
        state.summaries = ctx.recent_summaries(window).await;

        info!(
            readings = state.readings.len(),
            summaries = state.summaries.len(),
            days = state.window_days,
            "Fetched trend window"
        );

        if state.readings.is_empty() || state.summaries.is_empty() {
            return Ok(StepOutcome::Halt(TerminalStatus::no_op(format!(
                "insufficient data in the last {} days",
                state.window_days
            ))));
        }
        Ok(StepOutcome::Continue)
    })
}

fn compute_trends<'a>(
    _ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut TrendState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let (Some(realtime), Some(daily)) = (
            compute_realtime_trends(&state.readings),
            compute_daily_trends(&state.summaries),
        ) else {
            return Ok(StepOutcome::Halt(TerminalStatus::no_op("nothing to aggregate")));
        };

        state.request = Some(TrendRequest {
            window_days: state.window_days,
            realtime,
            daily,
        });
        Ok(StepOutcome::Continue)
    })
}

fn analyze<'a>(
    ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut TrendState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let Some(request) = &state.request else {
            return Err(WorkflowError::Graph("analyze reached without trends".to_string()));
        };
        let analysis = ctx.analyze(request).await?;
        info!(
            prediction = %analysis.prediction,
            risk_factors = analysis.risk_factors.len(),
            "Trend analysis complete"
        );
        state.analysis = Some(analysis);
        Ok(StepOutcome::Continue)
    })
}

fn log_summary<'a>(
    _ctx: &'a WorkflowContext,
    _run: &'a RunInfo,
    state: &'a mut TrendState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        if let Some(analysis) = &state.analysis {
            info!(confidence = ?analysis.confidence_level, "Trends normal: {}", analysis.trend_summary);
        }
        Ok(StepOutcome::Continue)
    })
}

fn sms_alert<'a>(
    ctx: &'a WorkflowContext,
    run: &'a RunInfo,
    state: &'a mut TrendState,
) -> BoxFuture<'a, StepResult> {
    Box::pin(async move {
        let message = state
            .analysis
            .as_ref()
            .and_then(|a| a.alert_message())
            .map(str::to_string);
        if let Some(message) = message {
            ctx.deliver(run, Channel::Sms, &message, None).await?;
            state.sent = true;
        }
        Ok(StepOutcome::Continue)
    })
}

pub fn graph() -> Result<WorkflowGraph<TrendState>, WorkflowError> {
    WorkflowGraph::new(NAME, "take_data")
        .step("take_data", take_data)
        .step("compute_trends", compute_trends)
        .step("analyze", analyze)
        .step("log_summary", log_summary)
        .step("sms_alert", sms_alert)
        .edge("take_data", "compute_trends")
        .edge("compute_trends", "analyze")
        .edge_if("analyze", is_normal, "log_summary")
        .edge_if("analyze", should_alert, "sms_alert")
        .edge("analyze", END)
        .edge("log_summary", END)
        .edge("sms_alert", END)
        .validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{Confidence, NarrativeError};
    use crate::workflow::{test_context, TestHandles};
    use chrono::Duration;
    use vitals_common::db::TelemetryStore;
    use vitals_common::models::{Nutrition, Sleep};
    use vitals_common::{Clock, SleepQuality};

    async fn seed(handles: &TestHandles, readings: bool, summaries: bool) {
        let now = handles.clock.now();
        for day in 0..10i64 {
            let ts = now - Duration::days(day) - Duration::hours(1);
            if readings {
                handles
                    .store
                    .insert_reading(&Reading {
                        heart_rate: 70 + day,
                        spo2: 97,
                        stress_level: 30,
                        steps: 1000 * (10 - day),
                        calories_burned: 50 * (10 - day),
                        timestamp: ts,
                    })
                    .await
                    .unwrap();
            }
            if summaries {
                handles
                    .store
                    .insert_summary(&WellnessSummary {
                        sleep: Sleep {
                            duration_minutes: 400 + day,
                            quality: SleepQuality::Good,
                            start: ts - Duration::hours(8),
                            end: ts - Duration::hours(1),
                        },
                        nutrition: Nutrition {
                            calories: 2000,
                            protein: 80,
                            carbs: 220,
                            fat: 65,
                        },
                        water_intake: 1.8,
                        energy_score: 75,
                        timestamp: ts,
                    })
                    .await
                    .unwrap();
            }
        }
    }

    fn analysis(prediction: Prediction, sms: Option<&str>) -> TrendAnalysis {
        TrendAnalysis {
            trend_summary: "Resting heart rate creeping up".to_string(),
            risk_factors: vec!["elevated heart rate".to_string()],
            prediction,
            confidence_level: Confidence::Medium,
            recommendations: vec!["prioritise sleep".to_string()],
            sms_message: sms.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_no_readings_never_consults_narrator() {
        let (ctx, handles) = test_context();
        seed(&handles, false, true).await;

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert!(matches!(report.status, TerminalStatus::NoOp { .. }));
        assert_eq!(report.path, vec!["take_data"]);
        assert_eq!(handles.narrator.analyze_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_summaries_is_no_op() {
        let (ctx, handles) = test_context();
        seed(&handles, true, false).await;

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert!(matches!(report.status, TerminalStatus::NoOp { .. }));
        assert_eq!(handles.narrator.analyze_calls(), 0);
    }

    #[tokio::test]
    async fn test_normal_prediction_logs_only() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;
        handles
            .narrator
            .push_analysis(Ok(analysis(Prediction::Normal, Some("all good"))));

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert_eq!(report.status, TerminalStatus::Normal);
        assert_eq!(
            report.path,
            vec!["take_data", "compute_trends", "analyze", "log_summary"]
        );
        assert_eq!(handles.sink.attempts(), 0);

        let request = report.state.request.unwrap();
        assert_eq!(request.realtime.total_records, 10);
        assert_eq!(request.daily.total_days, 10);
    }

    #[tokio::test]
    async fn test_watch_with_empty_message_sends_nothing() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;
        handles.narrator.push_analysis(Ok(analysis(Prediction::Watch, Some(""))));

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert!(matches!(report.status, TerminalStatus::NoOp { .. }));
        assert_eq!(report.path, vec!["take_data", "compute_trends", "analyze"]);
        assert_eq!(handles.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_or_missing_message_sends_nothing() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;
        handles
            .narrator
            .push_analysis(Ok(analysis(Prediction::Concern, Some("   "))));
        handles.narrator.push_analysis(Ok(analysis(Prediction::Concern, None)));

        let graph = graph().unwrap();
        for _ in 0..2 {
            let report = graph.run(&ctx, TrendState::new(90)).await;
            assert!(matches!(report.status, TerminalStatus::NoOp { .. }));
        }
        assert_eq!(handles.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_concern_with_message_texts() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;
        handles.narrator.push_analysis(Ok(analysis(
            Prediction::Concern,
            Some("  Your resting heart rate is trending up; consider a check-in.  "),
        )));

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert_eq!(report.status, TerminalStatus::Dispatched { channel: Channel::Sms });
        let sent = handles.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].message,
            "Your resting heart rate is trending up; consider a check-in."
        );
    }

    #[tokio::test]
    async fn test_analysis_failure_fails_closed() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;
        handles
            .narrator
            .push_analysis(Err(NarrativeError::Malformed("unknown prediction".into())));

        let report = graph().unwrap().run(&ctx, TrendState::new(90)).await;
        assert_eq!(report.status, TerminalStatus::GenerationFailed);
        assert_eq!(handles.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_window_excludes_old_data() {
        let (ctx, handles) = test_context();
        seed(&handles, true, true).await;

        // 10 days of data, 5 day window: days 0..=4 fall inside
        let report = graph().unwrap().run(&ctx, TrendState::new(5)).await;
        assert_eq!(report.status, TerminalStatus::Normal);
        assert_eq!(report.state.readings.len(), 5);
    }
}
