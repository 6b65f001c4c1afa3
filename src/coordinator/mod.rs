//! Sweep coordinator
//!
//! The coordinator owns two independent activities that share one store
//! handle and one bus connection:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   Coordinator                    │
//! │                                                  │
//! │  ┌────────────────────┐   activity-status.request│
//! │  │    Sweep loop      │ ──────────────────────▶  │  workers
//! │  │  - find_all        │                          │
//! │  │  - fan-out         │                          │
//! │  └────────────────────┘                          │
//! │                                                  │
//! │  ┌────────────────────┐  activity-status.response│
//! │  │ Response correlator│ ◀──────────────────────  │  workers
//! │  │  - decode          │                          │
//! │  │  - update by id    │                          │
//! │  └────────────────────┘                          │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use activity_status::coordinator::{Coordinator, CoordinatorConfig};
//!
//! let coordinator = Coordinator::new(
//!     store,
//!     bus,
//!     BusSubjects::default(),
//!     CoordinatorConfig::default(),
//! )?;
//! let handle = coordinator.start().await?;
//! // ...
//! handle.shutdown().await;
//! ```

pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod sweep;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusSubjects, MessageBus};
use crate::error::Result;
use crate::store::{InstanceStore, StoreError};

// Re-export main types
pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use correlator::{CorrelationOutcome, ResponseCorrelator};
pub use dispatch::{DispatchReport, Dispatcher};
pub use sweep::{SweepReport, SweepScheduler, SweepStats};

/// Wires the sweep loop and the response correlator together
pub struct Coordinator {
    scheduler: SweepScheduler,
    correlator: ResponseCorrelator,
}

impl Coordinator {
    /// Build a coordinator, rejecting a config the sweep loop cannot run with
    pub fn new(
        store: Arc<dyn InstanceStore>,
        bus: Arc<dyn MessageBus>,
        subjects: BusSubjects,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::new(Arc::clone(&bus), subjects.request_subject.clone());
        let scheduler =
            SweepScheduler::new(Arc::clone(&store), dispatcher, config.sweep_interval());
        let correlator = ResponseCorrelator::new(bus, store, subjects);

        Ok(Self {
            scheduler,
            correlator,
        })
    }

    pub fn scheduler(&self) -> &SweepScheduler {
        &self.scheduler
    }

    pub fn correlator(&self) -> &ResponseCorrelator {
        &self.correlator
    }

    /// Run a single sweep without starting the loop
    pub async fn sweep_once(&self) -> std::result::Result<SweepReport, StoreError> {
        self.scheduler.sweep().await
    }

    /// Subscribe to responses, then spawn the correlator and the sweep loop
    ///
    /// The response subscription is in place before the first request goes
    /// out.
    pub async fn start(&self) -> Result<CoordinatorHandle> {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let subscription = self.correlator.subscribe().await?;
        let correlator = self.correlator.clone();
        let correlator_rx = shutdown_rx.clone();
        let correlator_handle =
            tokio::spawn(async move { correlator.run(subscription, correlator_rx).await });

        let scheduler = self.scheduler.clone();
        let sweep_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        Ok(CoordinatorHandle {
            sweep_handle,
            correlator_handle,
            shutdown,
        })
    }
}

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Handle to a running coordinator
pub struct CoordinatorHandle {
    sweep_handle: JoinHandle<()>,
    correlator_handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl CoordinatorHandle {
    /// Wait for both tasks to complete
    pub async fn wait(self) {
        let _ = tokio::join!(self.sweep_handle, self.correlator_handle);
    }

    /// Trigger shutdown and wait
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    /// Check if both tasks are still running
    pub fn is_running(&self) -> bool {
        !self.sweep_handle.is_finished() && !self.correlator_handle.is_finished()
    }
}
