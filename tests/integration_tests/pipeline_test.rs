//! End-to-end tests: sweep → request → probe → response → store update
//!
//! Targets are wiremock servers, so every probe is a real HTTP request.

use activity_status::models::InstanceStatus;
use activity_status::store::InstanceStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{Stack, SETTLE_TIMEOUT};
use crate::common::{closed_addr, record_for, wait_until};

async fn mount_health(server: &MockServer, status: u16) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Test ACTIVE, then ERRORED, then INACTIVE for one instance
#[tokio::test]
async fn test_instance_lifecycle() {
    let target = MockServer::start().await;
    mount_health(&target, 200).await;

    let stack = Stack::with_records([record_for("i1", *target.address())]).await;
    let workers = stack.http_worker_pool(1).start().await.unwrap();
    let coordinator = stack.coordinator();
    let running = coordinator.start().await.unwrap();

    // The loop sweeps immediately on start
    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.status_of("i1").await == Some(InstanceStatus::Active)
        })
        .await
    );
    let first = stack.record("i1").await;
    let t1 = first.last_updated.unwrap();
    assert_eq!(first.last_active, Some(t1));

    // 500 at T2
    mount_health(&target, 500).await;
    coordinator.sweep_once().await.unwrap();
    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.status_of("i1").await == Some(InstanceStatus::Errored)
        })
        .await
    );
    let second = stack.record("i1").await;
    assert!(second.last_updated.unwrap() >= t1);
    assert_eq!(second.last_active, Some(t1));

    // Any other status at T3
    mount_health(&target, 503).await;
    coordinator.sweep_once().await.unwrap();
    assert!(
        wait_until(SETTLE_TIMEOUT, || async {
            stack.status_of("i1").await == Some(InstanceStatus::Inactive)
        })
        .await
    );
    assert_eq!(stack.record("i1").await.last_active, Some(t1));

    running.shutdown().await;
    workers.shutdown().await;
}

/// Test a whole fleet with mixed health in a single sweep
#[tokio::test]
async fn test_mixed_fleet_single_sweep() {
    let healthy = MockServer::start().await;
    mount_health(&healthy, 200).await;
    let failing = MockServer::start().await;
    mount_health(&failing, 500).await;
    let down = closed_addr().await;

    let stack = Stack::with_records([
        record_for("healthy", *healthy.address()),
        record_for("failing", *failing.address()),
        record_for("down", down),
    ])
    .await;
    let workers = stack.http_worker_pool(2).start().await.unwrap();
    let coordinator = stack.coordinator();
    let running = coordinator.start().await.unwrap();

    assert!(
        wait_until(SETTLE_TIMEOUT, || async { stack.store.update_count() == 3 }).await,
        "every instance should be updated once"
    );

    assert_eq!(stack.status_of("healthy").await, Some(InstanceStatus::Active));
    assert_eq!(stack.status_of("failing").await, Some(InstanceStatus::Errored));
    assert_eq!(stack.status_of("down").await, Some(InstanceStatus::Inactive));

    let down_record = stack.record("down").await;
    assert!(down_record.last_active.is_none());
    assert!(down_record.last_updated.is_some());

    running.shutdown().await;
    workers.shutdown().await;
}

/// Test records untouched by a sweep keep their fields
#[tokio::test]
async fn test_unchecked_fields_are_preserved() {
    let target = MockServer::start().await;
    mount_health(&target, 200).await;

    let stack = Stack::with_records([record_for("i1", *target.address())]).await;
    let before = stack.record("i1").await;

    let workers = stack.http_worker_pool(1).start().await.unwrap();
    let running = stack.coordinator().start().await.unwrap();

    assert!(wait_until(SETTLE_TIMEOUT, || async { stack.store.update_count() == 1 }).await);

    let after = stack.store.find_all().await.unwrap().remove(0);
    assert_eq!(after.id, before.id);
    assert_eq!(after.host, before.host);
    assert_eq!(after.port, before.port);
    assert_eq!(after.name, before.name);
    assert_eq!(after.region, before.region);

    running.shutdown().await;
    workers.shutdown().await;
}
