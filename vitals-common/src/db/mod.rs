//! Telemetry persistence
//!
//! The agent only ever talks to [`TelemetryStore`]; the SQLite backend is the
//! production default and the in-memory backend serves tests and ephemeral
//! runs.

#[cfg(feature = "sqlx")]
pub mod init;
pub mod memory;
#[cfg(feature = "sqlx")]
pub mod sqlite;
pub mod store;

#[cfg(feature = "sqlx")]
pub use init::init_database;
pub use memory::MemoryStore;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;
pub use store::TelemetryStore;
