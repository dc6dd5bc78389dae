//! Narrative generation
//!
//! Turns structured monitoring context into short subject-facing text. The
//! generator is fallible by contract: malformed or empty model output is an
//! error, so a workflow ends without dispatching rather than sending garbage.

pub mod llm;
pub mod mock;
pub mod prompt;

pub use llm::LlmNarrator;
pub use mock::ScriptedNarrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use vitals_common::{VitalSigns, WellnessSummary};

use crate::aggregator::{DailyTrends, RealtimeTrends, WindowAggregate};
use crate::classifier::Classification;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NarrativeError {
    #[error("Narrative service unavailable: {0}")]
    Unavailable(String),

    #[error("Narrative request failed: {0}")]
    RequestFailed(String),

    #[error("Narrative generation timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed narrative output: {0}")]
    Malformed(String),

    #[error("Narrative output contained an empty message")]
    EmptyMessage,
}

/// Context for a single subject-facing SMS
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageRequest {
    /// Low-alert reading plus trailing context (`None` = insufficient data)
    EmergencyAlert {
        vitals: VitalSigns,
        classification: Classification,
        context_minutes: u64,
        context: Option<WindowAggregate>,
    },
    /// Encouraging summary of the last few hours
    PeriodicWellness {
        window_hours: u64,
        aggregate: WindowAggregate,
    },
    /// Summary of the most recent daily digest
    DailyWellness { summary: WellnessSummary },
}

impl MessageRequest {
    pub fn label(&self) -> &'static str {
        match self {
            MessageRequest::EmergencyAlert { .. } => "emergency_alert",
            MessageRequest::PeriodicWellness { .. } => "periodic_wellness",
            MessageRequest::DailyWellness { .. } => "daily_wellness",
        }
    }
}

/// Long-horizon context for trend analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRequest {
    pub window_days: u64,
    pub realtime: RealtimeTrends,
    pub daily: DailyTrends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Normal,
    Watch,
    Concern,
}

impl Prediction {
    /// Whether the prediction warrants contacting the subject
    pub fn warrants_alert(&self) -> bool {
        matches!(self, Prediction::Watch | Prediction::Concern)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Prediction::Normal => "normal",
            Prediction::Watch => "watch",
            Prediction::Concern => "concern",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Structured trend-analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend_summary: String,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub prediction: Prediction,
    pub confidence_level: Confidence,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub sms_message: Option<String>,
}

impl TrendAnalysis {
    /// The SMS body, if present and not blank
    pub fn alert_message(&self) -> Option<&str> {
        self.sms_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Generator name for logs
    fn name(&self) -> &str;

    async fn compose_message(&self, request: &MessageRequest) -> Result<String, NarrativeError>;

    async fn analyze_trends(&self, request: &TrendRequest) -> Result<TrendAnalysis, NarrativeError>;
}

/// Models sometimes wrap JSON in a Markdown code fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Deserialize)]
struct MessageOutput {
    message: String,
}

/// Parse `{"message": "..."}` model output
pub fn parse_message(raw: &str) -> Result<String, NarrativeError> {
    let output: MessageOutput = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| NarrativeError::Malformed(e.to_string()))?;

    let message = output.message.trim();
    if message.is_empty() {
        return Err(NarrativeError::EmptyMessage);
    }
    Ok(message.to_string())
}

/// Parse trend-analysis model output
pub fn parse_trend_analysis(raw: &str) -> Result<TrendAnalysis, NarrativeError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| NarrativeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_trims() {
        assert_eq!(
            parse_message(r#"{"message": "  Take a short rest and drink some water.  "}"#).unwrap(),
            "Take a short rest and drink some water."
        );
    }

    #[test]
    fn test_parse_message_rejects_blank() {
        assert_eq!(parse_message(r#"{"message": "   "}"#), Err(NarrativeError::EmptyMessage));
    }

    #[test]
    fn test_parse_message_rejects_prose() {
        assert!(matches!(
            parse_message("Sure! Here is your SMS: rest a bit."),
            Err(NarrativeError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_message_accepts_fenced_json() {
        let raw = "```json\n{\"message\": \"Hydrate and breathe slowly.\"}\n```";
        assert_eq!(parse_message(raw).unwrap(), "Hydrate and breathe slowly.");
    }

    #[test]
    fn test_parse_trend_analysis_defaults() {
        let analysis = parse_trend_analysis(
            r#"{"trend_summary": "Stable", "prediction": "normal", "confidence_level": "high"}"#,
        )
        .unwrap();
        assert_eq!(analysis.prediction, Prediction::Normal);
        assert!(analysis.risk_factors.is_empty());
        assert_eq!(analysis.alert_message(), None);
    }

    #[test]
    fn test_parse_trend_analysis_rejects_unknown_prediction() {
        let result = parse_trend_analysis(
            r#"{"trend_summary": "?", "prediction": "alarming", "confidence_level": "high"}"#,
        );
        assert!(matches!(result, Err(NarrativeError::Malformed(_))));
    }

    #[test]
    fn test_alert_message_requires_non_blank_text() {
        let mut analysis = parse_trend_analysis(
            r#"{"trend_summary": "Rising stress", "prediction": "watch", "confidence_level": "medium", "sms_message": "  "}"#,
        )
        .unwrap();
        assert!(analysis.prediction.warrants_alert());
        assert_eq!(analysis.alert_message(), None);

        analysis.sms_message = Some(" Stress has crept up lately; try an evening walk. ".to_string());
        assert_eq!(
            analysis.alert_message(),
            Some("Stress has crept up lately; try an evening walk.")
        );
    }
}
