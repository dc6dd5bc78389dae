//! Data model
//!
//! Readings and wellness summaries are immutable once accepted. Their wire
//! shapes (`*Payload`) carry epoch-millisecond timestamps and are converted
//! to absolute UTC instants on validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::time::millis_to_datetime;
use crate::{Error, Result};

/// One real-time biometric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub heart_rate: i64,
    pub spo2: i64,
    /// 0..=100 on well-formed devices; not enforced
    pub stress_level: i64,
    /// Monotonic step counter
    pub steps: i64,
    /// Monotonic calorie counter
    pub calories_burned: i64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Validate a raw `realtimeData` payload
    pub fn from_payload(raw: &serde_json::Value) -> Result<Self> {
        let payload: ReadingPayload = serde_json::from_value(raw.clone())
            .map_err(|e| Error::InvalidInput(format!("realtime payload: {}", e)))?;
        payload.try_into()
    }

    /// The emergency-relevant view of this reading (counters stripped)
    pub fn vitals(&self) -> VitalSigns {
        VitalSigns {
            heart_rate: self.heart_rate,
            spo2: self.spo2,
            stress_level: self.stress_level,
            timestamp: self.timestamp,
        }
    }
}

/// Heart rate, SpO2 and stress of one reading, without the activity counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub heart_rate: i64,
    pub spo2: i64,
    pub stress_level: i64,
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of a `realtimeData` event
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingPayload {
    pub heart_rate: i64,
    pub spo2: i64,
    pub stress_level: i64,
    pub steps: i64,
    pub calories_burned: i64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl TryFrom<ReadingPayload> for Reading {
    type Error = Error;

    fn try_from(payload: ReadingPayload) -> Result<Self> {
        Ok(Self {
            heart_rate: payload.heart_rate,
            spo2: payload.spo2,
            stress_level: payload.stress_level,
            steps: payload.steps,
            calories_burned: payload.calories_burned,
            timestamp: millis_to_datetime(payload.timestamp)?,
        })
    }
}

/// Subjective sleep quality reported in the daily summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Good,
    Average,
    Poor,
}

impl SleepQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepQuality::Good => "good",
            SleepQuality::Average => "average",
            SleepQuality::Poor => "poor",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "good" => Ok(SleepQuality::Good),
            "average" => Ok(SleepQuality::Average),
            "poor" => Ok(SleepQuality::Poor),
            other => Err(Error::InvalidInput(format!("unknown sleep quality: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub duration_minutes: i64,
    pub quality: SleepQuality,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
}

/// One daily lifestyle digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessSummary {
    pub sleep: Sleep,
    pub nutrition: Nutrition,
    /// Litres
    pub water_intake: f64,
    pub energy_score: i64,
    pub timestamp: DateTime<Utc>,
}

impl WellnessSummary {
    /// Validate a raw `dailyData` payload
    pub fn from_payload(raw: &serde_json::Value) -> Result<Self> {
        let payload: SummaryPayload = serde_json::from_value(raw.clone())
            .map_err(|e| Error::InvalidInput(format!("daily payload: {}", e)))?;
        payload.try_into()
    }
}

/// Wire shape of a `dailyData` event
///
/// Unknown fields (e.g. device goals) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryPayload {
    pub sleep: SleepPayload,
    pub nutrition: Nutrition,
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub water_intake: f64,
    pub energy_score: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepPayload {
    /// Minutes
    pub duration: i64,
    pub quality: SleepQuality,
    pub start: i64,
    pub end: i64,
}

impl TryFrom<SummaryPayload> for WellnessSummary {
    type Error = Error;

    fn try_from(payload: SummaryPayload) -> Result<Self> {
        if !payload.water_intake.is_finite() {
            return Err(Error::InvalidInput("water_intake is not a finite number".to_string()));
        }
        Ok(Self {
            sleep: Sleep {
                duration_minutes: payload.sleep.duration,
                quality: payload.sleep.quality,
                start: millis_to_datetime(payload.sleep.start)?,
                end: millis_to_datetime(payload.sleep.end)?,
            },
            nutrition: payload.nutrition,
            water_intake: payload.water_intake,
            energy_score: payload.energy_score,
            timestamp: millis_to_datetime(payload.timestamp)?,
        })
    }
}

/// Devices report fixed-point values such as water intake as `"1.5"`
fn number_or_numeric_string<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("not a number: {:?}", s))),
    }
}

/// Kind of outbound notification tracked for cooldown purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    EmergencyCall,
    EmergencySms,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::EmergencyCall => "emergency_call",
            NotificationKind::EmergencySms => "emergency_sms",
            NotificationKind::Other(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "emergency_call" => NotificationKind::EmergencyCall,
            "emergency_sms" => NotificationKind::EmergencySms,
            other => NotificationKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NotificationKind::parse(&s))
    }
}

/// Append-only record of a notification that was actually delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOccurrence {
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl NotificationOccurrence {
    pub fn new(kind: NotificationKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }
}
