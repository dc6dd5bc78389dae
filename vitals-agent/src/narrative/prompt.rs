//! Prompt construction
//!
//! Context travels to the model as pretty-printed JSON; the model answers
//! with a JSON object whose shape is spelled out in the system prompt.

use super::{MessageRequest, NarrativeError, TrendRequest};

/// System + user prompt pair
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const SMS_RULES: &str = "\
Write one short SMS for the person wearing the monitor.
- At most two sentences and under 200 characters.
- Plain, calm language; no medical jargon.
- Reply with a JSON object of the form {\"message\": \"<sms text>\"} and nothing else.";

const TREND_RULES: &str = "\
You review three months of aggregated health data and look for changes over time,
not just current values: heart rate patterns, SpO2 consistency, stress levels,
sleep quality and duration, nutrition and energy, activity and recovery.

Choose a prediction:
- \"normal\": all trends are within healthy ranges
- \"watch\": some trends deserve monitoring but are not an immediate concern
- \"concern\": patterns suggest a developing health issue

For \"watch\" or \"concern\", include an SMS under 200 characters naming the trend,
one simple preventive step, and a suggestion to consult a clinician if needed.
For \"normal\", leave sms_message empty.

Reply with a JSON object and nothing else:
{\"trend_summary\": string, \"risk_factors\": [string], \"prediction\": \"normal\"|\"watch\"|\"concern\",
 \"confidence_level\": \"low\"|\"medium\"|\"high\", \"recommendations\": [string], \"sms_message\": string}";

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, NarrativeError> {
    serde_json::to_string_pretty(value).map_err(|e| NarrativeError::RequestFailed(e.to_string()))
}

pub fn message_prompt(request: &MessageRequest) -> Result<Prompt, NarrativeError> {
    let task = match request {
        MessageRequest::EmergencyAlert { context_minutes, .. } => format!(
            "A new reading triggered a low-level alert. Say what was detected (for example \
             \"slightly high heart rate\") and suggest a calm next step such as resting or \
             hydrating. Do not sound alarming. Averages cover the last {} minutes; a null \
             context means there was not enough recent data.",
            context_minutes
        ),
        MessageRequest::PeriodicWellness { window_hours, .. } => format!(
            "This is a periodic wellness check covering the last {} hours. Be positive and \
             encouraging, mention small deviations gently, and give one simple tip. A null \
             step or calorie delta means there was not enough data to measure activity.",
            window_hours
        ),
        MessageRequest::DailyWellness { .. } => "This is the daily wellness check. Summarize \
             overall wellness with positive highlights, any small alerts, and one simple tip \
             about hydration, sleep, activity or nutrition."
            .to_string(),
    };

    Ok(Prompt {
        system: format!("You are a health assistant monitoring a person's vitals.\n{}", SMS_RULES),
        user: format!("{}\n\nData:\n{}", task, to_json(request)?),
    })
}

pub fn trend_prompt(request: &TrendRequest) -> Result<Prompt, NarrativeError> {
    Ok(Prompt {
        system: format!("You are a health assistant.\n{}", TREND_RULES),
        user: format!(
            "Realtime data trends ({} days):\n{}\n\nDaily lifestyle trends ({} days):\n{}",
            request.window_days,
            to_json(&request.realtime)?,
            request.window_days,
            to_json(&request.daily)?
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use chrono::Utc;
    use vitals_common::Reading;

    #[test]
    fn test_periodic_prompt_carries_null_delta() {
        let reading = Reading {
            heart_rate: 75,
            spo2: 97,
            stress_level: 20,
            steps: 4000,
            calories_burned: 150,
            timestamp: Utc::now(),
        };
        let request = MessageRequest::PeriodicWellness {
            window_hours: 3,
            aggregate: aggregate(&[reading]).unwrap(),
        };

        let prompt = message_prompt(&request).unwrap();
        assert!(prompt.user.contains("last 3 hours"));
        assert!(prompt.user.contains("\"steps_delta\": null"));
        assert!(prompt.user.contains("\"kind\": \"periodic_wellness\""));
        assert!(prompt.system.contains("{\"message\""));
    }
}
