//! Store contract consumed by the agent
//!
//! All mutation is insert-only. Range queries use inclusive bounds and return
//! records newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NotificationKind, NotificationOccurrence, Reading, WellnessSummary};
use crate::Result;

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    async fn insert_reading(&self, reading: &Reading) -> Result<()>;

    async fn insert_summary(&self, summary: &WellnessSummary) -> Result<()>;

    async fn insert_notification(&self, occurrence: &NotificationOccurrence) -> Result<()>;

    /// Most recent summary by timestamp
    async fn latest_summary(&self) -> Result<Option<WellnessSummary>>;

    /// Most recent occurrence of `kind` by timestamp, regardless of the
    /// order the occurrences were inserted in
    async fn latest_notification(
        &self,
        kind: &NotificationKind,
    ) -> Result<Option<NotificationOccurrence>>;

    async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>>;

    async fn summaries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WellnessSummary>>;
}
