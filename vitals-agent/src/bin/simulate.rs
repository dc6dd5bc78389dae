//! vitals-sim - synthetic telemetry generator
//!
//! Posts `realtimeData` events with normal-range vitals and monotonic
//! counters, plus a `dailyData` summary on a slower cadence. `--override`
//! pins the vitals to fixed values (announced with `overrideSet`) to drive
//! the alert paths.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Override {
    heart_rate: i64,
    spo2: i64,
    stress_level: i64,
}

fn parse_override(raw: &str) -> Result<Override, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [hr, spo2, stress] = parts.as_slice() else {
        return Err("expected hr,spo2,stress".to_string());
    };
    let number = |s: &str| s.parse::<i64>().map_err(|_| format!("'{}' is not an integer", s));
    Ok(Override {
        heart_rate: number(*hr)?,
        spo2: number(*spo2)?,
        stress_level: number(*stress)?,
    })
}

/// Command-line arguments for vitals-sim
#[derive(Parser, Debug)]
#[command(name = "vitals-sim")]
#[command(about = "Synthetic telemetry generator for vitals-agent")]
#[command(version)]
struct Args {
    /// Base URL of the agent
    #[arg(short, long, default_value = "http://127.0.0.1:5780", env = "VITALS_AGENT_URL")]
    url: String,

    /// Seconds between realtime readings
    #[arg(long, default_value = "5")]
    realtime_every: u64,

    /// Seconds between daily summaries
    #[arg(long, default_value = "60")]
    daily_every: u64,

    /// Fixed vitals as hr,spo2,stress (e.g. 130,98,20)
    #[arg(long = "override", value_parser = parse_override)]
    override_vitals: Option<Override>,

    /// Stop after this many realtime readings (0 = run forever)
    #[arg(long, default_value = "0")]
    count: u64,
}

/// Monotonic activity counters
#[derive(Debug, Default)]
struct Counters {
    steps: i64,
    calories: i64,
}

fn realtime_payload(rng: &mut impl Rng, counters: &mut Counters, pinned: Option<Override>) -> Value {
    counters.steps += rng.gen_range(5..=20);
    counters.calories += rng.gen_range(1..=5);

    let vitals = pinned.unwrap_or_else(|| Override {
        heart_rate: rng.gen_range(60..=100),
        spo2: rng.gen_range(95..=100),
        stress_level: rng.gen_range(1..=40),
    });

    json!({
        "heart_rate": vitals.heart_rate,
        "spo2": vitals.spo2,
        "stress_level": vitals.stress_level,
        "steps": counters.steps,
        "calories_burned": counters.calories,
        "timestamp": Utc::now().timestamp_millis(),
    })
}

fn daily_payload(rng: &mut impl Rng) -> Value {
    let now = Utc::now().timestamp_millis();
    let quality = ["good", "average", "poor"][rng.gen_range(0..3)];
    json!({
        "sleep": {
            "duration": rng.gen_range(300..=500),
            "quality": quality,
            "start": now - 8 * 60 * 60 * 1000,
            "end": now,
        },
        "nutrition": {
            "calories": rng.gen_range(1500..=2500),
            "protein": rng.gen_range(40..=100),
            "carbs": rng.gen_range(150..=300),
            "fat": rng.gen_range(40..=90),
        },
        "water_intake": format!("{:.1}", rng.gen_range(0.5..3.0)),
        "energy_score": rng.gen_range(50..=95),
        "timestamp": now,
    })
}

async fn post_event(client: &reqwest::Client, url: &str, event: &str, data: Value) -> Result<()> {
    let response = client
        .post(format!("{}/events", url))
        .json(&json!({ "event": event, "data": data }))
        .send()
        .await
        .with_context(|| format!("Failed to post {}", event))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(event, %status, "Agent refused event: {}", body);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    if args.realtime_every == 0 || args.daily_every == 0 {
        bail!("intervals must be at least one second");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;
    let url = args.url.trim_end_matches('/').to_string();
    info!("Sending telemetry to {}", url);

    if let Some(pinned) = args.override_vitals {
        info!(?pinned, "Vitals override active");
        let data = json!({
            "heart_rate": pinned.heart_rate,
            "spo2": pinned.spo2,
            "stress_level": pinned.stress_level,
        });
        post_event(&client, &url, "overrideSet", data).await?;
    }

    let mut counters = Counters::default();
    let mut realtime = tokio::time::interval(Duration::from_secs(args.realtime_every));
    let mut daily = tokio::time::interval(Duration::from_secs(args.daily_every));
    // Skip the immediate first tick of the slow cadence
    daily.tick().await;
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = realtime.tick() => {
                let payload = realtime_payload(&mut rand::thread_rng(), &mut counters, args.override_vitals);
                if let Err(e) = post_event(&client, &url, "realtimeData", payload).await {
                    warn!("{:#}", e);
                }
                sent += 1;
                if args.count > 0 && sent >= args.count {
                    break;
                }
            }
            _ = daily.tick() => {
                let payload = daily_payload(&mut rand::thread_rng());
                if let Err(e) = post_event(&client, &url, "dailyData", payload).await {
                    warn!("{:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    if args.override_vitals.is_some() {
        post_event(&client, &url, "overrideCleared", json!({})).await?;
    }
    info!(sent, "Simulator finished");
    Ok(())
}
