//! activity-status - bus-mediated fleet health checking
//!
//! A coordinator periodically reads every known instance from a shared store
//! and publishes one check request per instance. A pool of workers, load
//! balanced through a queue group, probes each target over HTTP and publishes
//! the result. The coordinator correlates results back to instances by id and
//! records status, last update and last activity.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Instance records and status types
//! - [`protocol`] - Check request/response messages and their wire format
//! - [`bus`] - Message bus abstraction (in-memory, Redis Streams)
//! - [`store`] - Instance state store (in-memory, PostgreSQL)
//! - [`prober`] - HTTP liveness probe and classification
//! - [`worker`] - Probe worker pool
//! - [`coordinator`] - Sweep loop, fan-out and response correlation
//! - [`seed`] - Fleet seeding
//! - [`server`] - Instance liveness endpoint and admin router
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use activity_status::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let bus = Arc::new(RedisBus::connect(config.bus.redis.clone()).await?);
//!     let store = Arc::new(PostgresStore::connect(config.store.clone()).await?);
//!
//!     let coordinator = Coordinator::new(
//!         store,
//!         bus,
//!         config.bus.subjects.clone(),
//!         config.coordinator.clone(),
//!     )?;
//!     let handle = coordinator.start().await?;
//!     handle.wait().await;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod models;
pub mod prober;
pub mod protocol;
pub mod seed;
pub mod server;
pub mod store;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bus::{BusSubjects, MemoryBus, MessageBus, RedisBus};
    pub use crate::config::Config;
    pub use crate::coordinator::{Coordinator, CoordinatorConfig};
    pub use crate::error::{Error, ErrorCategory, Result, StatusErrorTrait};
    pub use crate::models::{InstanceId, InstanceRecord, InstanceStatus, NewInstance};
    pub use crate::prober::{HealthProber, Probe, ProberConfig};
    pub use crate::protocol::{BusMessage, CheckRequest, CheckResponse};
    pub use crate::store::{InstanceStore, MemoryStore, PostgresStore, UpdateOutcome};
    pub use crate::worker::{WorkerConfig, WorkerPool};
}

// Direct re-exports for convenience
pub use models::{InstanceId, InstanceRecord, InstanceStatus};
