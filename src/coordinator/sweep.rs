//! Sweep scheduling
//!
//! A sweep reads every instance record and fans out one check request per
//! record. The loop runs a sweep immediately and then once per interval on a
//! single timer; a sweep that overruns its interval delays the next tick
//! instead of triggering a burst, so sweeps never overlap.
//!
//! If the records cannot be read the sweep is abandoned before anything is
//! published and the loop waits for the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::dispatch::{DispatchReport, Dispatcher};
use crate::error::StatusErrorTrait;
use crate::metrics;
use crate::store::{InstanceStore, StoreError};

/// Result of one completed sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Records read from the store
    pub instances: usize,

    /// Fan-out results
    pub dispatch: DispatchReport,

    /// Wall time of the sweep
    pub elapsed: Duration,
}

/// Sweep counters
#[derive(Debug, Default)]
pub struct SweepStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl SweepStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Sweeps abandoned because the store scan failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Drives periodic sweeps
#[derive(Clone)]
pub struct SweepScheduler {
    store: Arc<dyn InstanceStore>,
    dispatcher: Dispatcher,
    interval: Duration,
    stats: Arc<SweepStats>,
}

impl SweepScheduler {
    pub fn new(store: Arc<dyn InstanceStore>, dispatcher: Dispatcher, interval: Duration) -> Self {
        Self {
            store,
            dispatcher,
            interval,
            stats: Arc::new(SweepStats::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> Arc<SweepStats> {
        Arc::clone(&self.stats)
    }

    /// Read every instance and publish a check request for each
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let started = Instant::now();
        metrics::record_sweep_started();
        tracing::info!("Sweep started, reading instances");

        let instances = match self.store.find_all().await {
            Ok(instances) => instances,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                metrics::record_sweep_failed();
                return Err(e);
            }
        };
        tracing::info!(
            count = instances.len(),
            unchecked = instances.iter().filter(|i| !i.is_checked()).count(),
            "Retrieved instances"
        );

        let dispatch = self.dispatcher.dispatch(&instances).await;
        metrics::record_dispatch(instances.len(), dispatch.published);
        self.stats.completed.fetch_add(1, Ordering::SeqCst);

        let report = SweepReport {
            instances: instances.len(),
            dispatch,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            instances = report.instances,
            subject = %self.dispatcher.subject(),
            published = report.dispatch.published,
            failed = report.dispatch.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Sweep completed"
        );

        Ok(report)
    }

    /// Sweep now and then every interval until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Sweep loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(
                            error = %e,
                            category = %e.category(),
                            recoverable = e.is_recoverable(),
                            "Sweep aborted, failed to read instances"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            completed = self.stats.completed(),
            failed = self.stats.failed(),
            "Sweep loop shutting down"
        );
    }
}
