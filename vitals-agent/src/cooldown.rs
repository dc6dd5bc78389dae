//! Notification cooldown gate
//!
//! A kind may fire only when strictly more than its window has elapsed since
//! its most recent recorded occurrence. History lives in the telemetry store,
//! so suppression survives restarts.
//!
//! Check, dispatch and record for one kind happen under a per-kind lease:
//! two concurrent alerts of the same kind cannot both pass inside one window.
//! Occurrences are recorded only after the sink acknowledges a send.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error};
use vitals_common::config::CooldownConfig;
use vitals_common::db::TelemetryStore;
use vitals_common::{Clock, NotificationKind, NotificationOccurrence};

/// Default minimum gap between two notifications of the same kind
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 30;

/// Window length per notification kind
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownPolicy {
    default_window: Duration,
    per_kind: HashMap<NotificationKind, Duration>,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MINUTES)
    }
}

/// Minutes as a window length, saturating at `Duration::MAX`
fn window(minutes: u64) -> Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or(Duration::MAX)
}

impl CooldownPolicy {
    pub fn new(default_minutes: u64) -> Self {
        Self {
            default_window: window(default_minutes),
            per_kind: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: NotificationKind, minutes: u64) -> Self {
        self.per_kind.insert(kind, window(minutes));
        self
    }

    pub fn from_config(config: &CooldownConfig) -> Self {
        config
            .per_kind
            .iter()
            .fold(Self::new(config.window_minutes), |policy, (name, minutes)| {
                policy.with_override(NotificationKind::parse(name), *minutes)
            })
    }

    pub fn window_for(&self, kind: &NotificationKind) -> Duration {
        self.per_kind.get(kind).copied().unwrap_or(self.default_window)
    }
}

pub struct CooldownGate {
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
    policy: CooldownPolicy,
    leases: Mutex<HashMap<NotificationKind, Arc<AsyncMutex<()>>>>,
}

impl CooldownGate {
    pub fn new(store: Arc<dyn TelemetryStore>, clock: Arc<dyn Clock>, policy: CooldownPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Whether `kind` may fire now
    ///
    /// No prior occurrence means allowed. An occurrence stamped in the future
    /// (clock skew) counts as zero elapsed. A store failure is treated as
    /// "no history" so an emergency is never swallowed by a broken store.
    pub async fn allowed(&self, kind: &NotificationKind) -> bool {
        let last = match self.store.latest_notification(kind).await {
            Ok(last) => last,
            Err(e) => {
                error!(kind = %kind, "Cooldown history unavailable, allowing: {}", e);
                return true;
            }
        };

        let Some(last) = last else {
            debug!(kind = %kind, "No prior occurrence");
            return true;
        };

        let elapsed = (self.clock.now() - last.timestamp).max(Duration::zero());
        let window = self.policy.window_for(kind);
        let allowed = elapsed > window;

        debug!(
            kind = %kind,
            elapsed_secs = elapsed.num_seconds(),
            window_secs = window.num_seconds(),
            allowed,
            "Cooldown check"
        );
        allowed
    }

    /// Append an occurrence for `kind` stamped with the current clock time
    pub async fn record(&self, kind: &NotificationKind) -> vitals_common::Result<NotificationOccurrence> {
        let occurrence = NotificationOccurrence::new(kind.clone(), self.clock.now());
        self.store.insert_notification(&occurrence).await?;
        Ok(occurrence)
    }

    /// Take the exclusive lease for `kind`
    ///
    /// Held across check, dispatch and record.
    pub async fn lease(&self, kind: &NotificationKind) -> CooldownLease<'_> {
        let lock = {
            let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
            leases
                .entry(kind.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        CooldownLease {
            gate: self,
            kind: kind.clone(),
            _guard: lock.lock_owned().await,
        }
    }
}

/// Exclusive right to check and record one notification kind
pub struct CooldownLease<'a> {
    gate: &'a CooldownGate,
    kind: NotificationKind,
    _guard: OwnedMutexGuard<()>,
}

impl CooldownLease<'_> {
    pub fn kind(&self) -> &NotificationKind {
        &self.kind
    }

    pub async fn allowed(&self) -> bool {
        self.gate.allowed(&self.kind).await
    }

    pub async fn record(&self) -> vitals_common::Result<NotificationOccurrence> {
        self.gate.record(&self.kind).await
    }
}
