//! Queue-group distribution tests
//!
//! Several workers share one queue group; every request must be handled by
//! exactly one of them.

use std::sync::Arc;
use std::time::Duration;

use activity_status::bus::{MessageBus, RESPONSE_SUBJECT};
use activity_status::models::InstanceStatus;
use activity_status::protocol::{BusMessage, CheckResponse};

use super::fixtures::{CountingProbe, Stack, SETTLE_TIMEOUT};
use crate::common::{create_record, wait_until};

const FLEET_SIZE: usize = 20;

async fn fleet() -> Stack {
    Stack::with_records(
        (0..FLEET_SIZE).map(|i| create_record(&format!("i{i}"), &format!("svc-{i}"), 8080)),
    )
    .await
}

/// Test two workers, N requests: N probes in total, none twice
#[tokio::test]
async fn test_two_workers_share_requests() {
    let stack = fleet().await;
    let probe = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::from_millis(5)));
    let workers = stack.worker_pool(probe.clone(), 2).start().await.unwrap();

    let coordinator = stack.coordinator();
    let running = coordinator.start().await.unwrap();

    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.store.update_count() == FLEET_SIZE as u64
        })
        .await
    );

    assert_eq!(probe.total_calls(), FLEET_SIZE);
    assert!(probe.calls().values().all(|&n| n == 1), "no request handled twice");
    assert_eq!(workers.total_handled(), FLEET_SIZE as u64);
    assert!(
        workers.stats().iter().all(|s| s.handled() > 0),
        "both workers should take part"
    );

    running.shutdown().await;
    workers.shutdown().await;
}

/// Test responses are identified only by instance id
#[tokio::test]
async fn test_each_request_yields_one_response() {
    let stack = fleet().await;
    let mut observer = stack
        .bus
        .queue_subscribe(RESPONSE_SUBJECT, "observer")
        .await
        .unwrap();
    let probe = Arc::new(CountingProbe::new(InstanceStatus::Inactive, Duration::ZERO));
    let workers = stack.worker_pool(probe, 3).start().await.unwrap();

    let report = stack.coordinator().sweep_once().await.unwrap();
    assert_eq!(report.dispatch.published, FLEET_SIZE);

    let mut ids = Vec::new();
    for _ in 0..FLEET_SIZE {
        let delivery = tokio::time::timeout(SETTLE_TIMEOUT, observer.next())
            .await
            .unwrap()
            .unwrap();
        let response = CheckResponse::decode(&delivery.payload).unwrap();
        assert_eq!(response.status, InstanceStatus::Inactive);

        let value: serde_json::Value = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 3, "id, status, checked_at only");

        ids.push(response.id);
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), FLEET_SIZE);

    workers.shutdown().await;
}

/// Test a late-joining worker picks up work published after it joined
#[tokio::test]
async fn test_worker_joining_between_sweeps() {
    let stack = fleet().await;
    let first = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::ZERO));
    let pool_a = stack.worker_pool(first.clone(), 1).start().await.unwrap();

    let coordinator = stack.coordinator();
    coordinator.sweep_once().await.unwrap();
    assert!(wait_until(SETTLE_TIMEOUT, || async { first.total_calls() == FLEET_SIZE }).await);

    let second = Arc::new(CountingProbe::new(InstanceStatus::Active, Duration::from_millis(2)));
    let pool_b = stack.worker_pool(second.clone(), 1).start().await.unwrap();

    coordinator.sweep_once().await.unwrap();
    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            first.total_calls() + second.total_calls() == 2 * FLEET_SIZE
        })
        .await
    );

    pool_a.shutdown().await;
    pool_b.shutdown().await;
}
