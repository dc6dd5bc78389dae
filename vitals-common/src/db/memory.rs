//! In-memory telemetry store
//!
//! Same semantics as the SQLite backend; contents are lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::store::TelemetryStore;
use crate::models::{NotificationKind, NotificationOccurrence, Reading, WellnessSummary};
use crate::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<Vec<Reading>>,
    summaries: RwLock<Vec<WellnessSummary>>,
    notifications: RwLock<Vec<NotificationOccurrence>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored notification occurrences (all kinds)
    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn reading_count(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn summary_count(&self) -> usize {
        self.summaries.read().await.len()
    }
}

/// Newest first; stable for equal timestamps so later inserts win ties
fn newest_first<T: Clone>(items: &[T], ts: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut indexed: Vec<(usize, &T)> = items.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| ts(b).cmp(&ts(a)).then(ib.cmp(ia)));
    indexed.into_iter().map(|(_, item)| item.clone()).collect()
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        self.readings.write().await.push(reading.clone());
        Ok(())
    }

    async fn insert_summary(&self, summary: &WellnessSummary) -> Result<()> {
        self.summaries.write().await.push(summary.clone());
        Ok(())
    }

    async fn insert_notification(&self, occurrence: &NotificationOccurrence) -> Result<()> {
        self.notifications.write().await.push(occurrence.clone());
        Ok(())
    }

    async fn latest_summary(&self) -> Result<Option<WellnessSummary>> {
        let summaries = self.summaries.read().await;
        Ok(newest_first(summaries.as_slice(), |s| s.timestamp).into_iter().next())
    }

    async fn latest_notification(
        &self,
        kind: &NotificationKind,
    ) -> Result<Option<NotificationOccurrence>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| &n.kind == kind)
            .max_by_key(|n| n.timestamp)
            .cloned())
    }

    async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let readings = self.readings.read().await;
        let in_range: Vec<Reading> = readings
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect();
        Ok(newest_first(&in_range, |r| r.timestamp))
    }

    async fn summaries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WellnessSummary>> {
        let summaries = self.summaries.read().await;
        let in_range: Vec<WellnessSummary> = summaries
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .cloned()
            .collect();
        Ok(newest_first(&in_range, |s| s.timestamp))
    }
}
