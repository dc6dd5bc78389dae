//! vitals-agent - biometric monitoring and alerting service
//!
//! Ingests realtime readings and daily summaries over HTTP, runs the
//! emergency workflow per reading and the wellness/trend workflows on their
//! cadences, and notifies the subject by SMS or voice call.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vitals_common::config::LoggingConfig;
use vitals_common::{Clock, EventBus, SystemClock};

use vitals_agent::config::{build_narrator, build_sink, open_store, AgentSettings, Args};
use vitals_agent::cooldown::{CooldownGate, CooldownPolicy};
use vitals_agent::dispatcher::Dispatcher;
use vitals_agent::pool::WorkerPool;
use vitals_agent::scheduler::{scheduled_jobs, WorkflowScheduler};
use vitals_agent::workflow::{WorkflowContext, WorkflowSettings, Workflows};
use vitals_agent::{build_router, AppState};

const EVENT_BUS_CAPACITY: usize = 256;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vitals_agent={level},vitals_common={level},tower_http=info",
            level = logging.level
        ))
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = AgentSettings::load(&args);
    init_tracing(&settings.config.logging)?;

    info!("Starting vitals-agent (biometric monitoring)");
    info!(
        "Version: {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        vitals_agent::GIT_HASH,
        vitals_agent::BUILD_TIMESTAMP,
        vitals_agent::BUILD_PROFILE
    );
    info!("Root folder: {}", settings.root_folder.display());

    let store = open_store(settings.config.storage.backend, &settings.root_folder)
        .await
        .context("Failed to open telemetry store")?;
    let narrator = build_narrator(&settings).context("Failed to build narrative generator")?;
    let sink = build_sink(&settings).context("Failed to build dispatch sink")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let policy = CooldownPolicy::from_config(&settings.config.cooldown);

    let ctx = WorkflowContext {
        store: store.clone(),
        narrator,
        sink,
        cooldown: CooldownGate::new(store, clock.clone(), policy),
        clock,
        events: events.clone(),
        settings: WorkflowSettings::from_config(&settings.config),
    };
    let workflows = Arc::new(Workflows::new(ctx).context("Invalid workflow graph")?);
    info!("Workflow graphs validated");

    let workers = &settings.config.workers;
    let pool = Arc::new(WorkerPool::start(workers.pool_size, workers.queue_capacity, events));
    let dispatcher = Arc::new(Dispatcher::new(workflows, pool.clone()));

    let mut scheduler = WorkflowScheduler::new(scheduled_jobs(&settings.config.schedule));
    scheduler.start(dispatcher.clone());

    let app = build_router(AppState::new(dispatcher));

    let bind = settings.bind();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.stop().await;
    pool.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
