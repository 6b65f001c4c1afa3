//! Test fixtures for integration tests
//!
//! Wires coordinator, workers, in-memory bus and in-memory store together
//! the same way the binary wires the Redis and PostgreSQL backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use activity_status::bus::{BusSubjects, MemoryBus};
use activity_status::coordinator::{Coordinator, CoordinatorConfig};
use activity_status::models::{InstanceId, InstanceRecord, InstanceStatus};
use activity_status::prober::{HealthProber, Probe, ProberConfig};
use activity_status::store::{InstanceStore, MemoryStore};
use activity_status::worker::{WorkerConfig, WorkerPool};
use async_trait::async_trait;

/// Probe timeout used against local targets
pub const TEST_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a test waits for the asynchronous pipeline to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory bus and store shared by every actor of one test
pub struct Stack {
    pub bus: MemoryBus,
    pub store: MemoryStore,
    pub subjects: BusSubjects,
}

impl Stack {
    pub async fn with_records(records: impl IntoIterator<Item = InstanceRecord>) -> Self {
        Self {
            bus: MemoryBus::new(),
            store: MemoryStore::with_records(records).await,
            subjects: BusSubjects::default(),
        }
    }

    /// Coordinator whose loop sweeps once at start and then stays idle
    pub fn coordinator(&self) -> Coordinator {
        Coordinator::new(
            Arc::new(self.store.clone()),
            Arc::new(self.bus.clone()),
            self.subjects.clone(),
            CoordinatorConfig::builder()
                .sweep_interval_secs(3600)
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    pub fn worker_pool(&self, prober: Arc<dyn Probe>, replicas: usize) -> WorkerPool {
        WorkerPool::new(
            Arc::new(self.bus.clone()),
            prober,
            self.subjects.clone(),
            WorkerConfig::default().with_replicas(replicas),
        )
    }

    /// Workers probing over real HTTP
    pub fn http_worker_pool(&self, replicas: usize) -> WorkerPool {
        let prober =
            HealthProber::new(ProberConfig::default().with_timeout(TEST_PROBE_TIMEOUT)).unwrap();
        self.worker_pool(Arc::new(prober), replicas)
    }

    pub async fn record(&self, id: &str) -> InstanceRecord {
        self.store
            .find_by_id(&InstanceId::new(id))
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn status_of(&self, id: &str) -> Option<InstanceStatus> {
        self.record(id).await.status
    }
}

/// Probe that answers a fixed status and counts calls per host
pub struct CountingProbe {
    status: InstanceStatus,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingProbe {
    pub fn new(status: InstanceStatus, delay: Duration) -> Self {
        Self {
            status,
            delay,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> HashMap<String, usize> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Probe for CountingProbe {
    async fn probe(&self, host: &str, _port: u16) -> InstanceStatus {
        *self.calls.lock().unwrap().entry(host.to_string()).or_default() += 1;
        tokio::time::sleep(self.delay).await;
        self.status
    }
}
