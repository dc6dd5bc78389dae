//! Deterministic in-process narrator
//!
//! Serves queued responses in order; once a queue is empty it falls back to
//! templated text built from the request. Used by tests and when no model
//! endpoint is configured.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    Confidence, MessageRequest, NarrativeError, NarrativeGenerator, Prediction, TrendAnalysis,
    TrendRequest,
};

#[derive(Default)]
pub struct ScriptedNarrator {
    messages: Mutex<VecDeque<Result<String, NarrativeError>>>,
    analyses: Mutex<VecDeque<Result<TrendAnalysis, NarrativeError>>>,
    requests: Mutex<Vec<MessageRequest>>,
    delay: Option<Duration>,
    compose_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
}

impl ScriptedNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every answer (timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_message(&self, response: Result<String, NarrativeError>) {
        lock(&self.messages).push_back(response);
    }

    pub fn push_analysis(&self, response: Result<TrendAnalysis, NarrativeError>) {
        lock(&self.analyses).push_back(response);
    }

    pub fn compose_calls(&self) -> usize {
        self.compose_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    /// Requests seen by `compose_message`, oldest first
    pub fn requests(&self) -> Vec<MessageRequest> {
        lock(&self.requests).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn fmt_avg(value: Option<f64>) -> String {
    value.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "n/a".to_string())
}

/// Templated text used when nothing is queued
pub fn render_offline(request: &MessageRequest) -> String {
    match request {
        MessageRequest::EmergencyAlert { vitals, context, .. } => format!(
            "Heads up: HR {} bpm, SpO2 {}%, stress {} (recent avg HR {}). Please rest for a few minutes and hydrate.",
            vitals.heart_rate,
            vitals.spo2,
            vitals.stress_level,
            fmt_avg(context.as_ref().map(|c| c.avg_heart_rate))
        ),
        MessageRequest::PeriodicWellness { window_hours, aggregate } => format!(
            "Last {}h: avg HR {:.0} bpm, SpO2 {:.0}%, {} steps. Keep it up and stay hydrated!",
            window_hours,
            aggregate.avg_heart_rate,
            aggregate.avg_spo2,
            aggregate
                .steps_delta
                .map(|s| s.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ),
        MessageRequest::DailyWellness { summary } => format!(
            "You slept {}h{:02}m ({}) and your energy score is {}. Have a great day!",
            summary.sleep.duration_minutes / 60,
            summary.sleep.duration_minutes % 60,
            summary.sleep.quality.as_str(),
            summary.energy_score
        ),
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedNarrator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn compose_message(&self, request: &MessageRequest) -> Result<String, NarrativeError> {
        self.compose_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        self.pause().await;

        let queued = lock(&self.messages).pop_front();
        match queued {
            Some(response) => response,
            None => Ok(render_offline(request)),
        }
    }

    async fn analyze_trends(&self, request: &TrendRequest) -> Result<TrendAnalysis, NarrativeError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let queued = lock(&self.analyses).pop_front();
        match queued {
            Some(response) => response,
            None => Ok(TrendAnalysis {
                trend_summary: format!(
                    "{} readings over {} days; average heart rate {:.0} bpm.",
                    request.realtime.total_records,
                    request.window_days,
                    request.realtime.overall_averages.heart_rate
                ),
                risk_factors: Vec::new(),
                prediction: Prediction::Normal,
                confidence_level: Confidence::Low,
                recommendations: Vec::new(),
                sms_message: None,
            }),
        }
    }
}
