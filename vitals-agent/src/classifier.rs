//! Severity classification of a single reading
//!
//! Each metric is classified independently against inclusive threshold
//! bands; the overall severity is the worst of the three. Classification is
//! total: values outside any physical range fall through to `HighAlert`.

use serde::Serialize;
use std::fmt;
use vitals_common::VitalSigns;

/// Ordered severity tier (`Normal < LowAlert < HighAlert`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    LowAlert,
    HighAlert,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::LowAlert => "low_alert",
            Severity::HighAlert => "high_alert",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive bands for one metric; anything outside both is `HighAlert`
struct Bands {
    normal: &'static [(i64, i64)],
    low_alert: &'static [(i64, i64)],
}

const HEART_RATE_BANDS: Bands = Bands {
    normal: &[(60, 100)],
    low_alert: &[(50, 59), (101, 110)],
};

const SPO2_BANDS: Bands = Bands {
    normal: &[(95, 100)],
    low_alert: &[(93, 94)],
};

const STRESS_BANDS: Bands = Bands {
    normal: &[(0, 40)],
    low_alert: &[(41, 60)],
};

impl Bands {
    fn classify(&self, value: i64) -> Severity {
        let within = |ranges: &[(i64, i64)]| ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&value));
        if within(self.normal) {
            Severity::Normal
        } else if within(self.low_alert) {
            Severity::LowAlert
        } else {
            Severity::HighAlert
        }
    }
}

/// Per-metric breakdown plus the reduced overall decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub heart_rate: Severity,
    pub spo2: Severity,
    pub stress_level: Severity,
    pub overall: Severity,
}

pub fn classify_heart_rate(bpm: i64) -> Severity {
    HEART_RATE_BANDS.classify(bpm)
}

pub fn classify_spo2(percent: i64) -> Severity {
    SPO2_BANDS.classify(percent)
}

pub fn classify_stress(level: i64) -> Severity {
    STRESS_BANDS.classify(level)
}

/// Classify a reading's vital signs
pub fn classify(vitals: &VitalSigns) -> Classification {
    let heart_rate = classify_heart_rate(vitals.heart_rate);
    let spo2 = classify_spo2(vitals.spo2);
    let stress_level = classify_stress(vitals.stress_level);

    Classification {
        heart_rate,
        spo2,
        stress_level,
        overall: heart_rate.max(spo2).max(stress_level),
    }
}
