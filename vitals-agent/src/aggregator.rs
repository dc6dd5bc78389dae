//! Windowed statistics over readings and wellness summaries
//!
//! Aggregating zero records yields `None`; callers treat that as "no
//! analysis possible". Counter deltas need two records and are resolved by
//! timestamp, never by input order.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use vitals_common::{Reading, SleepQuality, WellnessSummary};

/// Number of most recent sleep / nutrition entries kept for display
pub const RECENT_DAYS: usize = 7;
/// Number of most recent energy / hydration values kept for display
pub const RECENT_SCORES: usize = 14;

/// Trailing lookback window ending at "now"
///
/// Lengths beyond what chrono can represent saturate to `Duration::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback(Duration);

fn saturating(units: u64, ctor: fn(i64) -> Option<Duration>) -> Duration {
    i64::try_from(units).ok().and_then(ctor).unwrap_or(Duration::MAX)
}

impl Lookback {
    pub fn minutes(minutes: u64) -> Self {
        Self(saturating(minutes, Duration::try_minutes))
    }

    pub fn hours(hours: u64) -> Self {
        Self(saturating(hours, Duration::try_hours))
    }

    pub fn days(days: u64) -> Self {
        Self(saturating(days, Duration::try_days))
    }

    /// Inclusive `(start, end)` bounds for a window ending at `now`
    ///
    /// A window reaching past the earliest representable instant starts there.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = now.checked_sub_signed(self.0).unwrap_or(DateTime::<Utc>::MIN_UTC);
        (start, now)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

/// Means and counter deltas over one window of readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowAggregate {
    pub record_count: usize,
    pub avg_heart_rate: f64,
    pub avg_spo2: f64,
    pub avg_stress_level: f64,
    /// Newest minus oldest step counter; `None` with fewer than two records
    /// or when the counters are too far apart to subtract
    pub steps_delta: Option<i64>,
    /// Newest minus oldest calorie counter; same rules as `steps_delta`
    pub calories_delta: Option<i64>,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
}

fn mean<T>(items: &[T], value: impl Fn(&T) -> f64) -> f64 {
    items.iter().map(value).sum::<f64>() / items.len() as f64
}

/// Aggregate a window of readings (any order)
pub fn aggregate(records: &[Reading]) -> Option<WindowAggregate> {
    let oldest = records.iter().min_by_key(|r| r.timestamp)?;
    let newest = records.iter().max_by_key(|r| r.timestamp)?;
    let has_span = records.len() >= 2;

    Some(WindowAggregate {
        record_count: records.len(),
        avg_heart_rate: mean(records, |r| r.heart_rate as f64),
        avg_spo2: mean(records, |r| r.spo2 as f64),
        avg_stress_level: mean(records, |r| r.stress_level as f64),
        steps_delta: has_span.then(|| newest.steps.checked_sub(oldest.steps)).flatten(),
        calories_delta: has_span
            .then(|| newest.calories_burned.checked_sub(oldest.calories_burned))
            .flatten(),
        first_timestamp: oldest.timestamp,
        last_timestamp: newest.timestamp,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalAverages {
    pub heart_rate: f64,
    pub spo2: f64,
    pub stress_level: f64,
}

/// One calendar-week bucket of readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyVitals {
    pub record_count: usize,
    pub avg_heart_rate: f64,
    pub avg_spo2: f64,
    pub avg_stress_level: f64,
    pub steps_delta: Option<i64>,
    pub calories_delta: Option<i64>,
}

/// Long-horizon view of the realtime stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeTrends {
    pub total_records: usize,
    pub date_range: DateRange,
    /// Keyed `YYYY-Www` (ISO 8601 week, Monday start)
    pub weekly_averages: BTreeMap<String, WeeklyVitals>,
    pub overall_averages: VitalAverages,
}

/// ISO week bucket key for an instant
///
/// Uses the ISO week-numbering year, so the days around New Year that share
/// a week share a key.
pub fn week_key(ts: DateTime<Utc>) -> String {
    ts.format("%G-W%V").to_string()
}

pub fn compute_realtime_trends(records: &[Reading]) -> Option<RealtimeTrends> {
    let overall = aggregate(records)?;

    let mut buckets: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
    for record in records {
        buckets
            .entry(week_key(record.timestamp))
            .or_default()
            .push(record.clone());
    }

    let weekly_averages = buckets
        .into_iter()
        .filter_map(|(week, bucket)| {
            aggregate(&bucket).map(|agg| {
                (
                    week,
                    WeeklyVitals {
                        record_count: agg.record_count,
                        avg_heart_rate: agg.avg_heart_rate,
                        avg_spo2: agg.avg_spo2,
                        avg_stress_level: agg.avg_stress_level,
                        steps_delta: agg.steps_delta,
                        calories_delta: agg.calories_delta,
                    },
                )
            })
        })
        .collect();

    Some(RealtimeTrends {
        total_records: overall.record_count,
        date_range: DateRange {
            start: overall.first_timestamp,
            end: overall.last_timestamp,
        },
        weekly_averages,
        overall_averages: VitalAverages {
            heart_rate: overall.avg_heart_rate,
            spo2: overall.avg_spo2,
            stress_level: overall.avg_stress_level,
        },
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityDistribution {
    pub good: usize,
    pub average: usize,
    pub poor: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepEntry {
    pub duration_minutes: i64,
    pub quality: SleepQuality,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepTrends {
    pub average_duration_minutes: f64,
    pub quality_distribution: QualityDistribution,
    /// Newest first
    pub recent_pattern: Vec<SleepEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionEntry {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionTrends {
    pub avg_calories: f64,
    pub avg_protein: f64,
    pub avg_carbs: f64,
    pub avg_fat: f64,
    pub recent_pattern: Vec<NutritionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyTrends {
    pub average_score: f64,
    pub recent_scores: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydrationTrends {
    pub average_intake: f64,
    pub recent_intake: Vec<f64>,
}

/// Long-horizon view of the daily summary stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrends {
    pub total_days: usize,
    pub sleep_analysis: SleepTrends,
    pub nutrition_analysis: NutritionTrends,
    pub energy_trends: EnergyTrends,
    pub hydration_trends: HydrationTrends,
}

pub fn compute_daily_trends(summaries: &[WellnessSummary]) -> Option<DailyTrends> {
    if summaries.is_empty() {
        return None;
    }

    let mut newest_first: Vec<&WellnessSummary> = summaries.iter().collect();
    newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut distribution = QualityDistribution::default();
    for summary in &newest_first {
        match summary.sleep.quality {
            SleepQuality::Good => distribution.good += 1,
            SleepQuality::Average => distribution.average += 1,
            SleepQuality::Poor => distribution.poor += 1,
        }
    }

    Some(DailyTrends {
        total_days: summaries.len(),
        sleep_analysis: SleepTrends {
            average_duration_minutes: mean(summaries, |s| s.sleep.duration_minutes as f64),
            quality_distribution: distribution,
            recent_pattern: newest_first
                .iter()
                .take(RECENT_DAYS)
                .map(|s| SleepEntry {
                    duration_minutes: s.sleep.duration_minutes,
                    quality: s.sleep.quality,
                    date: s.timestamp,
                })
                .collect(),
        },
        nutrition_analysis: NutritionTrends {
            avg_calories: mean(summaries, |s| s.nutrition.calories as f64),
            avg_protein: mean(summaries, |s| s.nutrition.protein as f64),
            avg_carbs: mean(summaries, |s| s.nutrition.carbs as f64),
            avg_fat: mean(summaries, |s| s.nutrition.fat as f64),
            recent_pattern: newest_first
                .iter()
                .take(RECENT_DAYS)
                .map(|s| NutritionEntry {
                    calories: s.nutrition.calories,
                    protein: s.nutrition.protein,
                    carbs: s.nutrition.carbs,
                    fat: s.nutrition.fat,
                    date: s.timestamp,
                })
                .collect(),
        },
        energy_trends: EnergyTrends {
            average_score: mean(summaries, |s| s.energy_score as f64),
            recent_scores: newest_first
                .iter()
                .take(RECENT_SCORES)
                .map(|s| s.energy_score)
                .collect(),
        },
        hydration_trends: HydrationTrends {
            average_intake: mean(summaries, |s| s.water_intake),
            recent_intake: newest_first
                .iter()
                .take(RECENT_SCORES)
                .map(|s| s.water_intake)
                .collect(),
        },
    })
}
