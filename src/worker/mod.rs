//! Probe worker pool
//!
//! Every worker joins the worker queue group on the request subject, so each
//! check request reaches exactly one live worker. A worker handles one
//! request to completion (decode, probe, publish) before taking the next.
//!
//! Responses carry only the instance id, the classification and the probe
//! timestamp; nothing identifies the worker that produced them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusError, BusSubjects, Delivery, MessageBus, Subscription};
use crate::error::StatusErrorTrait;
use crate::metrics;
use crate::prober::Probe;
use crate::protocol::{BusMessage, CheckRequest, CheckResponse};

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Workers started by one process
    pub replicas: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { replicas: 1 }
    }
}

impl WorkerConfig {
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.replicas == 0 {
            return Err("replicas must be greater than 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    handled: AtomicU64,
    dropped: AtomicU64,
    publish_failed: AtomicU64,
}

impl WorkerStats {
    /// Requests probed and answered (publish attempted)
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    /// Requests dropped at decode
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Responses that could not be published
    pub fn publish_failed(&self) -> u64 {
        self.publish_failed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Worker
// ============================================================================

/// One member of the worker queue group
pub struct Worker {
    index: usize,
    bus: Arc<dyn MessageBus>,
    prober: Arc<dyn Probe>,
    subjects: BusSubjects,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(
        index: usize,
        bus: Arc<dyn MessageBus>,
        prober: Arc<dyn Probe>,
        subjects: BusSubjects,
    ) -> Self {
        Self {
            index,
            bus,
            prober,
            subjects,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Decode one request and probe its target
    ///
    /// Returns `None` when the payload cannot be decoded; nothing is
    /// published for such a request.
    pub async fn handle_request(&self, payload: &[u8]) -> Option<CheckResponse> {
        let request = match CheckRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    worker = self.index,
                    error = %e,
                    category = %e.category(),
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping undecodable check request"
                );
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                metrics::record_decode_error(&self.subjects.request_subject);
                return None;
            }
        };

        let started = Instant::now();
        let status = self.prober.probe(&request.host, request.port).await;
        metrics::record_probe(status, started.elapsed().as_secs_f64());

        tracing::debug!(
            worker = self.index,
            instance_id = %request.id,
            host = %request.host,
            port = request.port,
            status = %status,
            "Probed instance"
        );

        Some(CheckResponse::now(request.id, status))
    }

    /// Handle one delivery end to end, publishing the response if any
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let Some(response) = self.handle_request(&delivery.payload).await else {
            return;
        };
        self.stats.handled.fetch_add(1, Ordering::SeqCst);

        let payload = match response.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(worker = self.index, error = %e, "Failed to encode check response");
                self.stats.publish_failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        match self.bus.publish(&self.subjects.response_subject, payload).await {
            Ok(()) => {
                tracing::info!(
                    worker = self.index,
                    instance_id = %response.id,
                    status = %response.status,
                    "Published check response"
                );
            }
            Err(e) => {
                tracing::warn!(
                    worker = self.index,
                    instance_id = %response.id,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Failed to publish check response"
                );
                self.stats.publish_failed.fetch_add(1, Ordering::SeqCst);
                metrics::record_publish_error(&self.subjects.response_subject);
            }
        }
    }

    /// Consume the subscription until it closes or shutdown is signalled
    pub async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker = self.index,
            subject = %subscription.subject(),
            group = %subscription.group(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                delivery = subscription.next() => {
                    match delivery {
                        Some(delivery) => self.handle_delivery(delivery).await,
                        None => {
                            tracing::warn!(worker = self.index, "Request subscription closed");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        subscription.unsubscribe();
        tracing::info!(
            worker = self.index,
            handled = self.stats.handled(),
            dropped = self.stats.dropped(),
            "Worker stopped"
        );
    }
}

// ============================================================================
// Pool
// ============================================================================

/// A set of workers sharing one bus and one prober
pub struct WorkerPool {
    bus: Arc<dyn MessageBus>,
    prober: Arc<dyn Probe>,
    subjects: BusSubjects,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        prober: Arc<dyn Probe>,
        subjects: BusSubjects,
        config: WorkerConfig,
    ) -> Self {
        Self {
            bus,
            prober,
            subjects,
            config,
        }
    }

    /// Join the worker group once per replica, then spawn the workers
    ///
    /// Every member has subscribed by the time this returns.
    pub async fn start(&self) -> Result<WorkerPoolHandle, BusError> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(self.config.replicas);

        for index in 0..self.config.replicas {
            let subscription = self
                .bus
                .queue_subscribe(&self.subjects.request_subject, &self.subjects.worker_group)
                .await?;
            let worker = Worker::new(
                index,
                Arc::clone(&self.bus),
                Arc::clone(&self.prober),
                self.subjects.clone(),
            );
            workers.push((worker, subscription));
        }

        let mut stats = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());
        for (worker, subscription) in workers {
            stats.push(worker.stats());
            handles.push(tokio::spawn(worker.run(subscription, shutdown_rx.clone())));
        }

        tracing::info!(
            replicas = self.config.replicas,
            subject = %self.subjects.request_subject,
            group = %self.subjects.worker_group,
            "Worker pool started"
        );

        Ok(WorkerPoolHandle {
            handles,
            stats,
            shutdown,
        })
    }
}

/// Handle to a running worker pool
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
    stats: Vec<Arc<WorkerStats>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPoolHandle {
    /// Per-worker counters, indexed by worker
    pub fn stats(&self) -> &[Arc<WorkerStats>] {
        &self.stats
    }

    /// Requests handled across the pool
    pub fn total_handled(&self) -> u64 {
        self.stats.iter().map(|s| s.handled()).sum()
    }

    /// Wait for all workers to finish
    pub async fn wait(self) {
        futures::future::join_all(self.handles).await;
    }

    /// Signal shutdown and wait for in-flight requests to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    /// Check if any worker is still running
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }
}
