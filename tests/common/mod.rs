//! Common test utilities

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use activity_status::models::{InstanceId, InstanceRecord, NewInstance};

/// Create an unchecked instance record
#[allow(dead_code)]
pub fn create_record(id: &str, host: &str, port: u16) -> InstanceRecord {
    InstanceRecord::from_new(
        InstanceId::new(id),
        NewInstance::new(format!("instance-{id}"), "asia", host, port),
    )
}

/// Record pointing at a listening socket
#[allow(dead_code)]
pub fn record_for(id: &str, addr: SocketAddr) -> InstanceRecord {
    create_record(id, &addr.ip().to_string(), addr.port())
}

/// Address nothing is listening on
#[allow(dead_code)]
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll `check` until it returns true or `timeout` elapses
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
