//! Bounded worker pool
//!
//! A fixed number of workers pull jobs from one bounded queue. Each job runs
//! in its own spawned task so a panic is caught at the `JoinHandle` and the
//! worker keeps going. When the queue is full new jobs are rejected rather
//! than buffered.

use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vitals_common::{EventBus, MonitorEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Overloaded,

    #[error("worker pool is shut down")]
    Closed,
}

struct Job {
    label: String,
    task: BoxFuture<'static, ()>,
}

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events: EventBus,
    size: usize,
    capacity: usize,
    completed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start `size` workers over a queue holding at most `capacity` jobs
    pub fn start(size: usize, capacity: usize, events: EventBus) -> Self {
        let size = size.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let completed = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let completed = Arc::clone(&completed);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting for the next job
                        let next = rx.lock().await.recv().await;
                        let Some(job) = next else {
                            debug!(worker, "Queue closed, worker exiting");
                            break;
                        };

                        debug!(worker, job = %job.label, "Job started");
                        if let Err(e) = tokio::spawn(job.task).await {
                            if e.is_panic() {
                                error!(worker, job = %job.label, "Job panicked: {}", e);
                            } else {
                                warn!(worker, job = %job.label, "Job cancelled: {}", e);
                            }
                        }
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        info!(workers = size, queue_capacity = capacity, "Worker pool started");

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            events,
            size,
            capacity,
            completed,
        }
    }

    /// Queue a job without waiting; fails fast when the queue is full
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<(), SubmitError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let result = match sender {
            Some(tx) => tx
                .try_send(Job {
                    label: label.clone(),
                    task: Box::pin(task),
                })
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => SubmitError::Overloaded,
                    mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
                }),
            None => Err(SubmitError::Closed),
        };

        if let Err(e) = &result {
            warn!(job = %label, "Job rejected: {}", e);
            self.events.emit_lossy(MonitorEvent::JobRejected {
                job: label,
                reason: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        match &*self.sender.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(tx) => self.capacity - tx.capacity(),
            None => 0,
        }
    }

    /// Jobs finished so far, including panicked ones
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, drain the queue, and wait for the workers
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        info!(pending = workers.len(), "Draining worker pool");
        for handle in workers {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
        info!(completed = self.completed(), "Worker pool stopped");
    }
}
