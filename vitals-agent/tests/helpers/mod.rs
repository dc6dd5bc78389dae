//! Shared fixtures for vitals-agent integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use vitals_agent::cooldown::{CooldownGate, CooldownPolicy};
use vitals_agent::dispatcher::Dispatcher;
use vitals_agent::narrative::ScriptedNarrator;
use vitals_agent::pool::WorkerPool;
use vitals_agent::sink::RecordingSink;
use vitals_agent::workflow::{WorkflowContext, WorkflowSettings, Workflows};
use vitals_agent::AppState;
use vitals_common::db::{MemoryStore, TelemetryStore};
use vitals_common::models::{Nutrition, Sleep};
use vitals_common::{
    Clock, Error, EventBus, ManualClock, NotificationKind, NotificationOccurrence, Reading,
    Result, SleepQuality, WellnessSummary,
};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap()
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl TelemetryStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn insert_reading(&self, _reading: &Reading) -> Result<()> {
        Err(Error::Internal("store offline".into()))
    }

    async fn insert_summary(&self, _summary: &WellnessSummary) -> Result<()> {
        Err(Error::Internal("store offline".into()))
    }

    async fn insert_notification(&self, _occurrence: &NotificationOccurrence) -> Result<()> {
        Err(Error::Internal("store offline".into()))
    }

    async fn latest_summary(&self) -> Result<Option<WellnessSummary>> {
        Err(Error::Internal("store offline".into()))
    }

    async fn latest_notification(
        &self,
        _kind: &NotificationKind,
    ) -> Result<Option<NotificationOccurrence>> {
        Err(Error::Internal("store offline".into()))
    }

    async fn readings_in_range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        Err(Error::Internal("store offline".into()))
    }

    async fn summaries_in_range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<WellnessSummary>> {
        Err(Error::Internal("store offline".into()))
    }
}

/// In-process agent over recording collaborators and a manual clock
pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub narrator: Arc<ScriptedNarrator>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
    pub workflows: Arc<Workflows>,
    pub pool: Arc<WorkerPool>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None, ScriptedNarrator::new(), 2, 32)
    }

    pub fn with_narrator(narrator: ScriptedNarrator) -> Self {
        Self::build(None, narrator, 2, 32)
    }

    pub fn build_with(narrator: ScriptedNarrator, pool_size: usize, capacity: usize) -> Self {
        Self::build(None, narrator, pool_size, capacity)
    }

    /// Every store call fails; `memory` is unused
    pub fn with_failing_store() -> Self {
        Self::build(Some(Arc::new(FailingStore)), ScriptedNarrator::new(), 2, 32)
    }

    fn build(
        store_override: Option<Arc<dyn TelemetryStore>>,
        narrator: ScriptedNarrator,
        pool_size: usize,
        capacity: usize,
    ) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn TelemetryStore> = match store_override {
            Some(store) => store,
            None => memory.clone(),
        };
        let narrator = Arc::new(narrator);
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(base_time()));
        let events = EventBus::new(256);

        let ctx = WorkflowContext {
            store: store.clone(),
            narrator: narrator.clone(),
            sink: sink.clone(),
            cooldown: CooldownGate::new(store, clock.clone(), CooldownPolicy::default()),
            clock: clock.clone(),
            events: events.clone(),
            settings: WorkflowSettings::default(),
        };
        let workflows = Arc::new(Workflows::new(ctx).unwrap());
        let pool = Arc::new(WorkerPool::start(pool_size, capacity, events.clone()));
        let dispatcher = Arc::new(Dispatcher::new(workflows.clone(), pool.clone()));

        Self {
            memory,
            narrator,
            sink,
            clock,
            events,
            workflows,
            pool,
            dispatcher,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.dispatcher.clone())
    }

    /// Wait for every queued run to finish
    pub async fn drain(&self) {
        self.pool.shutdown().await;
    }
}

pub fn reading_at(ts: DateTime<Utc>, heart_rate: i64, spo2: i64, stress_level: i64) -> Reading {
    Reading {
        heart_rate,
        spo2,
        stress_level,
        steps: 4000,
        calories_burned: 180,
        timestamp: ts,
    }
}

pub fn summary_at(ts: DateTime<Utc>, energy_score: i64) -> WellnessSummary {
    WellnessSummary {
        sleep: Sleep {
            duration_minutes: 445,
            quality: SleepQuality::Good,
            start: ts - Duration::hours(8),
            end: ts - Duration::hours(1),
        },
        nutrition: Nutrition {
            calories: 2050,
            protein: 85,
            carbs: 240,
            fat: 70,
        },
        water_intake: 2.1,
        energy_score,
        timestamp: ts,
    }
}

/// `realtimeData` payload as a device sends it (epoch milliseconds)
pub fn realtime_json(ts: DateTime<Utc>, heart_rate: i64, spo2: i64, stress_level: i64) -> Value {
    json!({
        "heart_rate": heart_rate,
        "spo2": spo2,
        "stress_level": stress_level,
        "steps": 5230,
        "calories_burned": 212,
        "timestamp": ts.timestamp_millis(),
    })
}

/// `dailyData` payload as a device sends it, including fields the agent ignores
pub fn daily_json(ts: DateTime<Utc>, energy_score: i64) -> Value {
    let ms = ts.timestamp_millis();
    json!({
        "sleep": {
            "duration": 420,
            "quality": "average",
            "start": ms - 8 * 3_600_000,
            "end": ms,
        },
        "nutrition": { "calories": 1980, "protein": 72, "carbs": 230, "fat": 61 },
        "water_intake": "1.8",
        "goals": { "step_goal": 10000, "calorie_goal": 2500, "sleep_goal": 480, "water_goal": 2.5 },
        "energy_score": energy_score,
        "timestamp": ms,
    })
}
