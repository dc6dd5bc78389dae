//! # Vitals Common Library
//!
//! Shared code for the vitals monitoring agent and its tools:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Data model (readings, wellness summaries, notification history)
//! - Telemetry store contract with SQLite and in-memory backends
//! - Monitor event bus
//! - Time utilities and the injectable clock

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, MonitorEvent};
pub use models::{
    NotificationKind, NotificationOccurrence, Reading, SleepQuality, VitalSigns,
    WellnessSummary,
};
pub use time::{Clock, ManualClock, SystemClock};
