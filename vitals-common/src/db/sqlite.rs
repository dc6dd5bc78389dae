//! SQLite telemetry store
//!
//! Instants are stored as epoch milliseconds (UTC) so ordering and range
//! filters are plain integer comparisons.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::store::TelemetryStore;
use crate::models::{
    NotificationKind, NotificationOccurrence, Nutrition, Reading, Sleep, SleepQuality,
    WellnessSummary,
};
use crate::time::{datetime_to_millis, millis_to_datetime};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = super::init::init_database(db_path).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema must already exist
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn reading_from_row(row: &SqliteRow) -> Result<Reading> {
    Ok(Reading {
        heart_rate: row.try_get("heart_rate")?,
        spo2: row.try_get("spo2")?,
        stress_level: row.try_get("stress_level")?,
        steps: row.try_get("steps")?,
        calories_burned: row.try_get("calories_burned")?,
        timestamp: millis_to_datetime(row.try_get("timestamp_ms")?)?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<WellnessSummary> {
    let quality: String = row.try_get("sleep_quality")?;
    Ok(WellnessSummary {
        sleep: Sleep {
            duration_minutes: row.try_get("sleep_duration_minutes")?,
            quality: SleepQuality::parse(&quality)?,
            start: millis_to_datetime(row.try_get("sleep_start_ms")?)?,
            end: millis_to_datetime(row.try_get("sleep_end_ms")?)?,
        },
        nutrition: Nutrition {
            calories: row.try_get("calories")?,
            protein: row.try_get("protein")?,
            carbs: row.try_get("carbs")?,
            fat: row.try_get("fat")?,
        },
        water_intake: row.try_get("water_intake")?,
        energy_score: row.try_get("energy_score")?,
        timestamp: millis_to_datetime(row.try_get("timestamp_ms")?)?,
    })
}

const SUMMARY_COLUMNS: &str = "sleep_duration_minutes, sleep_quality, sleep_start_ms, sleep_end_ms, \
     calories, protein, carbs, fat, water_intake, energy_score, timestamp_ms";

#[async_trait]
impl TelemetryStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (heart_rate, spo2, stress_level, steps, calories_burned, timestamp_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.heart_rate)
        .bind(reading.spo2)
        .bind(reading.stress_level)
        .bind(reading.steps)
        .bind(reading.calories_burned)
        .bind(datetime_to_millis(reading.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_summary(&self, summary: &WellnessSummary) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO wellness_summaries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SUMMARY_COLUMNS
        ))
        .bind(summary.sleep.duration_minutes)
        .bind(summary.sleep.quality.as_str())
        .bind(datetime_to_millis(summary.sleep.start))
        .bind(datetime_to_millis(summary.sleep.end))
        .bind(summary.nutrition.calories)
        .bind(summary.nutrition.protein)
        .bind(summary.nutrition.carbs)
        .bind(summary.nutrition.fat)
        .bind(summary.water_intake)
        .bind(summary.energy_score)
        .bind(datetime_to_millis(summary.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_notification(&self, occurrence: &NotificationOccurrence) -> Result<()> {
        sqlx::query("INSERT INTO notification_history (kind, timestamp_ms) VALUES (?, ?)")
            .bind(occurrence.kind.as_str())
            .bind(datetime_to_millis(occurrence.timestamp))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn latest_summary(&self) -> Result<Option<WellnessSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wellness_summaries ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
            SUMMARY_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn latest_notification(
        &self,
        kind: &NotificationKind,
    ) -> Result<Option<NotificationOccurrence>> {
        let timestamp_ms: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(timestamp_ms) FROM notification_history WHERE kind = ?",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        timestamp_ms
            .map(|ms| Ok(NotificationOccurrence::new(kind.clone(), millis_to_datetime(ms)?)))
            .transpose()
    }

    async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let rows = sqlx::query(
            r#"
            SELECT heart_rate, spo2, stress_level, steps, calories_burned, timestamp_ms
            FROM readings
            WHERE timestamp_ms >= ? AND timestamp_ms <= ?
            ORDER BY timestamp_ms DESC, id DESC
            "#,
        )
        .bind(datetime_to_millis(start))
        .bind(datetime_to_millis(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    async fn summaries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WellnessSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wellness_summaries \
             WHERE timestamp_ms >= ? AND timestamp_ms <= ? \
             ORDER BY timestamp_ms DESC, id DESC",
            SUMMARY_COLUMNS
        ))
        .bind(datetime_to_millis(start))
        .bind(datetime_to_millis(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }
}
