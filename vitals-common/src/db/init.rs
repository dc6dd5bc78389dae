//! Database initialization
//!
//! Creates the database file and schema on first run; opening an existing
//! database is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the ingestion path append while workflows read windows
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_readings_table(pool).await?;
    create_wellness_summaries_table(pool).await?;
    create_notification_history_table(pool).await?;
    Ok(())
}

async fn create_readings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            heart_rate INTEGER NOT NULL,
            spo2 INTEGER NOT NULL,
            stress_level INTEGER NOT NULL,
            steps INTEGER NOT NULL,
            calories_burned INTEGER NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            received_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp_ms)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_wellness_summaries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wellness_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sleep_duration_minutes INTEGER NOT NULL,
            sleep_quality TEXT NOT NULL CHECK (sleep_quality IN ('good', 'average', 'poor')),
            sleep_start_ms INTEGER NOT NULL,
            sleep_end_ms INTEGER NOT NULL,
            calories INTEGER NOT NULL,
            protein INTEGER NOT NULL,
            carbs INTEGER NOT NULL,
            fat INTEGER NOT NULL,
            water_intake REAL NOT NULL,
            energy_score INTEGER NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            received_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_wellness_summaries_timestamp ON wellness_summaries(timestamp_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_notification_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notification_history_kind_ts ON notification_history(kind, timestamp_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
