//! Dispatcher and worker pool integration tests
//!
//! Validation, best-effort persistence, fire-and-forget workflow runs, and
//! backpressure when the queue is full.

mod helpers;

use helpers::{daily_json, realtime_json, Harness};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vitals_agent::dispatcher::{Admission, InboundEvent};
use vitals_agent::narrative::ScriptedNarrator;
use vitals_agent::scheduler::{ScheduledJob, WorkflowScheduler};
use vitals_agent::sink::Channel;
use vitals_agent::workflow::WorkflowKind;
use vitals_common::MonitorEvent;

#[tokio::test]
async fn test_reading_is_persisted_then_emergency_runs() {
    let h = Harness::new();

    let admission = h.dispatcher.on_reading(&realtime_json(h.now(), 130, 98, 20)).await;
    assert_eq!(admission, Admission::Accepted);
    // Persisted before the run is queued
    assert_eq!(h.memory.reading_count().await, 1);

    h.drain().await;
    assert_eq!(h.sink.sent_on(Channel::Call), 1);
    assert_eq!(h.memory.notification_count().await, 1);
}

#[tokio::test]
async fn test_invalid_payload_is_dropped() {
    let h = Harness::new();
    let mut events = h.events.subscribe();

    let missing_field = json!({ "heart_rate": 130, "spo2": 98, "timestamp": 1 });
    let admission = h.dispatcher.on_reading(&missing_field).await;
    assert!(matches!(admission, Admission::Rejected(_)));

    let bad_quality = json!({
        "sleep": { "duration": 400, "quality": "excellent", "start": 0, "end": 1 },
        "nutrition": { "calories": 1, "protein": 1, "carbs": 1, "fat": 1 },
        "water_intake": 1.0,
        "energy_score": 50,
        "timestamp": 1,
    });
    assert!(matches!(h.dispatcher.on_summary(&bad_quality).await, Admission::Rejected(_)));

    h.drain().await;
    assert_eq!(h.memory.reading_count().await, 0);
    assert_eq!(h.memory.summary_count().await, 0);
    assert_eq!(h.sink.attempts(), 0);

    match events.recv().await.unwrap() {
        MonitorEvent::PayloadRejected { event, .. } => assert_eq!(event, "realtimeData"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_range_timestamp_is_rejected() {
    let h = Harness::new();
    let mut payload = realtime_json(h.now(), 80, 98, 20);
    payload["timestamp"] = json!(i64::MAX);

    assert!(matches!(h.dispatcher.on_reading(&payload).await, Admission::Rejected(_)));
}

#[tokio::test]
async fn test_implausible_values_are_accepted_and_classified() {
    let h = Harness::new();

    let admission = h.dispatcher.on_reading(&realtime_json(h.now(), -5, 250, 999)).await;
    assert_eq!(admission, Admission::Accepted);

    h.drain().await;
    assert_eq!(h.sink.sent_on(Channel::Call), 1);
}

#[tokio::test]
async fn test_persistence_failure_does_not_block_emergency() {
    let h = Harness::with_failing_store();

    let admission = h.dispatcher.on_reading(&realtime_json(h.now(), 130, 98, 20)).await;
    assert_eq!(admission, Admission::Accepted);

    h.drain().await;
    assert_eq!(h.sink.sent_on(Channel::Call), 1);
}

#[tokio::test]
async fn test_daily_summary_triggers_daily_wellness() {
    let h = Harness::new();

    let admission = h.dispatcher.on_summary(&daily_json(h.now(), 77)).await;
    assert_eq!(admission, Admission::Accepted);
    assert_eq!(h.memory.summary_count().await, 1);

    h.drain().await;
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, Channel::Sms);
    assert!(sent[0].message.contains("energy score is 77"));
}

#[tokio::test]
async fn test_advisory_events_are_acknowledged_only() {
    let h = Harness::new();
    let mut events = h.events.subscribe();

    let admission = h
        .dispatcher
        .handle(InboundEvent::OverrideSet, &json!({ "heart_rate": 130 }))
        .await;
    assert_eq!(admission, Admission::Accepted);

    match events.recv().await.unwrap() {
        MonitorEvent::AdvisoryReceived { event, .. } => assert_eq!(event, "overrideSet"),
        other => panic!("unexpected event: {:?}", other),
    }

    h.drain().await;
    assert_eq!(h.pool.completed(), 0);
    assert_eq!(h.sink.attempts(), 0);
}

#[tokio::test]
async fn test_full_queue_reports_overloaded() {
    // One worker stuck on a slow narrator; one queue slot
    let narrator = ScriptedNarrator::new().with_delay(Duration::from_millis(300));
    let h = Harness::build_with(narrator, 1, 1);
    let mut events = h.events.subscribe();

    // Low alerts go through the narrator, so each run takes ~300ms
    let low = |minute: i64| realtime_json(h.now() + chrono::Duration::seconds(minute), 105, 98, 20);

    assert_eq!(h.dispatcher.on_reading(&low(0)).await, Admission::Accepted);
    while h.pool.queued() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(h.dispatcher.on_reading(&low(1)).await, Admission::Accepted);
    assert_eq!(h.dispatcher.on_reading(&low(2)).await, Admission::Overloaded);

    // The refused reading was still persisted
    assert_eq!(h.memory.reading_count().await, 3);

    let mut rejected = false;
    while let Ok(event) = events.try_recv() {
        if let MonitorEvent::JobRejected { job, .. } = event {
            assert_eq!(job, WorkflowKind::Emergency.as_str());
            rejected = true;
        }
    }
    assert!(rejected);

    h.drain().await;
    assert_eq!(h.pool.completed(), 2);
}

#[tokio::test]
async fn test_scheduler_ticks_queue_cadence_workflows() {
    let h = Harness::new();
    let mut events = h.events.subscribe();

    let mut scheduler = WorkflowScheduler::new(vec![ScheduledJob {
        workflow: WorkflowKind::TrendAnalysis,
        every: Duration::from_millis(20),
    }]);
    scheduler.start(Arc::clone(&h.dispatcher));

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(MonitorEvent::WorkflowFinished { workflow, status, .. }) = events.recv().await {
                break (workflow, status);
            }
        }
    })
    .await
    .expect("a scheduled run finishes");

    scheduler.stop().await;
    assert_eq!(finished.0, "trend_analysis");
    assert_eq!(finished.1, "no_op");
}
