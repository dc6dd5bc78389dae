//! Cadence scheduler
//!
//! One interval per timer-driven workflow. A tick only queues the run on the
//! worker pool, so a slow run never delays the next tick of any cadence.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vitals_common::config::ScheduleConfig;

use crate::dispatcher::Dispatcher;
use crate::workflow::WorkflowKind;

/// One scheduled workflow and its cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    pub workflow: WorkflowKind,
    pub every: Duration,
}

/// Cadences from config; a zero interval disables that workflow
pub fn scheduled_jobs(config: &ScheduleConfig) -> Vec<ScheduledJob> {
    [
        (WorkflowKind::PeriodicWellness, config.periodic_wellness_minutes),
        (WorkflowKind::DailyWellness, config.daily_wellness_minutes),
        (WorkflowKind::TrendAnalysis, config.trend_analysis_minutes),
    ]
    .into_iter()
    .filter(|(workflow, minutes)| {
        if *minutes == 0 {
            info!(workflow = %workflow, "Cadence disabled");
        }
        *minutes > 0
    })
    .map(|(workflow, minutes)| ScheduledJob {
        workflow,
        every: Duration::from_secs(minutes.saturating_mul(60)),
    })
    .collect()
}

pub struct WorkflowScheduler {
    jobs: Vec<ScheduledJob>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkflowScheduler {
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            jobs,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Token that stops every cadence when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn one timer task per job; the first tick fires one interval from now
    pub fn start(&mut self, dispatcher: Arc<Dispatcher>) {
        for job in self.jobs.clone() {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = self.cancel.clone();

            info!(workflow = %job.workflow, every_secs = job.every.as_secs(), "Scheduling workflow");
            self.handles.push(tokio::spawn(async move {
                let mut timer = interval_at(Instant::now() + job.every, job.every);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(workflow = %job.workflow, "Cadence stopped");
                            break;
                        }
                        _ = timer.tick() => {
                            debug!(workflow = %job.workflow, "Cadence tick");
                            if let Err(e) = dispatcher.trigger(job.workflow) {
                                warn!(workflow = %job.workflow, "Scheduled run skipped: {}", e);
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Cancel every cadence and wait for the timer tasks to exit
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_jobs_from_config() {
        let jobs = scheduled_jobs(&ScheduleConfig::default());
        assert_eq!(
            jobs,
            vec![
                ScheduledJob {
                    workflow: WorkflowKind::PeriodicWellness,
                    every: Duration::from_secs(180 * 60),
                },
                ScheduledJob {
                    workflow: WorkflowKind::DailyWellness,
                    every: Duration::from_secs(1440 * 60),
                },
                ScheduledJob {
                    workflow: WorkflowKind::TrendAnalysis,
                    every: Duration::from_secs(1440 * 60),
                },
            ]
        );
    }

    #[test]
    fn test_zero_minutes_disables_cadence() {
        let config = ScheduleConfig {
            periodic_wellness_minutes: 0,
            ..Default::default()
        };
        let jobs = scheduled_jobs(&config);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.workflow != WorkflowKind::PeriodicWellness));
    }
}
