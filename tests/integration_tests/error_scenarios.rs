//! Error scenario integration tests
//!
//! Failure modes that must be absorbed without stopping the pipeline:
//! 1. Malformed check requests
//! 2. Malformed or unknown check responses
//! 3. Store scan failures during a sweep
//! 4. Store update failures while correlating
//! 5. Publishing with nobody subscribed

use std::sync::Arc;
use std::time::Duration;

use activity_status::bus::MessageBus;
use activity_status::coordinator::CorrelationOutcome;
use activity_status::models::{InstanceId, InstanceRecord, InstanceStatus};
use activity_status::protocol::{BusMessage, CheckResponse};
use activity_status::store::InstanceStore;

use super::fixtures::{CountingProbe, Stack, SETTLE_TIMEOUT};
use crate::common::{create_record, wait_until};

// ============================================================================
// Malformed messages
// ============================================================================

#[tokio::test]
async fn test_malformed_request_yields_no_response() {
    let stack = Stack::with_records([create_record("i1", "svc-a", 8080)]).await;
    let mut responses = stack
        .bus
        .queue_subscribe(&stack.subjects.response_subject, "observer")
        .await
        .unwrap();

    let probe = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::ZERO));
    let workers = stack.worker_pool(probe.clone(), 1).start().await.unwrap();

    for payload in [
        &b"not json"[..],
        br#"{"id":"i1","host":"svc-a"}"#,
        br#"{"id":"","host":"svc-a","port":8080}"#,
        br#"{"id":"i1","host":"svc-a","port":0}"#,
    ] {
        stack
            .bus
            .publish(&stack.subjects.request_subject, payload.to_vec())
            .await
            .unwrap();
    }

    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            workers.stats().iter().map(|s| s.dropped()).sum::<u64>() == 4
        })
        .await
    );
    assert_eq!(probe.total_calls(), 0);
    assert_eq!(workers.total_handled(), 0);

    let next = tokio::time::timeout(Duration::from_millis(100), responses.next()).await;
    assert!(next.is_err(), "no response may be published");

    // The worker is still serving
    stack.coordinator().sweep_once().await.unwrap();
    assert!(wait_until(SETTLE_TIMEOUT, || async { probe.total_calls() == 1 }).await);

    workers.shutdown().await;
}

#[tokio::test]
async fn test_malformed_response_leaves_store_untouched() {
    let stack = Stack::with_records([create_record("i1", "svc-a", 8080)]).await;
    let before = stack.record("i1").await;
    let correlator = stack.coordinator().correlator().clone();

    for payload in [
        &b"{"[..],
        br#"{"id":"i1","status":"UNKNOWN","checked_at":"2024-05-01T00:00:00Z"}"#,
        br#"{"id":"i1","status":"ACTIVE","checked_at":"yesterday"}"#,
        br#"{"id":"i1","status":"ACTIVE"}"#,
    ] {
        assert_eq!(
            correlator.handle_payload(payload).await,
            CorrelationOutcome::Dropped
        );
    }

    assert_eq!(stack.store.update_count(), 0);
    assert_eq!(stack.record("i1").await, before);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let stack = Stack::with_records([create_record("i1", "svc-a", 8080)]).await;
    let correlator = stack.coordinator().correlator().clone();

    let response = CheckResponse::now(InstanceId::new("ghost"), InstanceStatus::Active);
    let outcome = correlator.handle_payload(&response.encode().unwrap()).await;

    assert_eq!(outcome, CorrelationOutcome::NotFound(InstanceId::new("ghost")));
    assert_eq!(stack.store.update_count(), 0);
    assert!(stack.store.find_by_id(&InstanceId::new("ghost")).await.unwrap().is_none());
    assert_eq!(stack.status_of("i1").await, None);
}

#[tokio::test]
async fn test_correlator_survives_bad_responses_on_the_bus() {
    let stack = Stack::with_records([create_record("i1", "svc-a", 8080)]).await;
    let running = stack.coordinator().start().await.unwrap();

    stack
        .bus
        .publish(&stack.subjects.response_subject, b"garbage".to_vec())
        .await
        .unwrap();
    let valid = CheckResponse::now(InstanceId::new("i1"), InstanceStatus::Errored);
    stack
        .bus
        .publish(&stack.subjects.response_subject, valid.encode().unwrap())
        .await
        .unwrap();

    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.status_of("i1").await == Some(InstanceStatus::Errored)
        })
        .await
    );
    assert!(running.is_running());

    running.shutdown().await;
}

// ============================================================================
// Store and bus failures
// ============================================================================

#[tokio::test]
async fn test_sweep_aborts_on_scan_failure() {
    let stack = Stack::with_records([
        create_record("i1", "svc-a", 8080),
        create_record("i2", "svc-b", 8080),
    ])
    .await;
    let probe = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::ZERO));
    let workers = stack.worker_pool(probe.clone(), 1).start().await.unwrap();
    let coordinator = stack.coordinator();

    stack.store.set_fail_scans(true);
    let published_before = stack.bus.published_count();
    assert!(coordinator.sweep_once().await.is_err());
    assert_eq!(stack.bus.published_count(), published_before);
    assert_eq!(coordinator.scheduler().stats().failed(), 1);

    // The next sweep proceeds normally
    stack.store.set_fail_scans(false);
    let report = coordinator.sweep_once().await.unwrap();
    assert_eq!(report.dispatch.published, 2);
    assert!(wait_until(SETTLE_TIMEOUT, || async { probe.total_calls() == 2 }).await);

    workers.shutdown().await;
}

#[tokio::test]
async fn test_correlator_survives_failed_update() {
    let stack = Stack::with_records([
        create_record("i1", "svc-a", 8080),
        create_record("i2", "svc-b", 8080),
    ])
    .await;
    let running = stack.coordinator().start().await.unwrap();

    stack.store.set_fail_updates(true);
    let lost = CheckResponse::now(InstanceId::new("i1"), InstanceStatus::Active);
    stack
        .bus
        .publish(&stack.subjects.response_subject, lost.encode().unwrap())
        .await
        .unwrap();
    assert!(wait_until(SETTLE_TIMEOUT, || async { stack.store.failed_update_count() == 1 }).await);
    assert!(running.is_running());

    stack.store.set_fail_updates(false);
    let applied = CheckResponse::now(InstanceId::new("i2"), InstanceStatus::Inactive);
    stack
        .bus
        .publish(&stack.subjects.response_subject, applied.encode().unwrap())
        .await
        .unwrap();
    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.status_of("i2").await == Some(InstanceStatus::Inactive)
        })
        .await
    );

    // The failed response is not retried
    assert_eq!(stack.status_of("i1").await, None);
    assert_eq!(stack.store.update_count(), 1);
    assert!(running.is_running());

    running.shutdown().await;
}

#[tokio::test]
async fn test_requests_without_workers_are_discarded() {
    let stack = Stack::with_records([create_record("i1", "svc-a", 8080)]).await;

    let report = stack.coordinator().sweep_once().await.unwrap();
    assert_eq!(report.dispatch.published, 1);
    assert_eq!(stack.bus.discarded_count(), 1);

    // Workers joining later never see the earlier request
    let probe = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::ZERO));
    let workers = stack.worker_pool(probe.clone(), 1).start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.total_calls(), 0);
    assert_eq!(stack.status_of("i1").await, None);

    workers.shutdown().await;
}

#[tokio::test]
async fn test_empty_store_sweep_publishes_nothing() {
    let stack = Stack::with_records(Vec::<InstanceRecord>::new()).await;

    let report = stack.coordinator().sweep_once().await.unwrap();
    assert_eq!(report.instances, 0);
    assert_eq!(report.dispatch.total(), 0);
    assert_eq!(stack.bus.published_count(), 0);
}
