//! Message bus abstraction with queue-group delivery
//!
//! Every actor in the system talks to the others only through a
//! [`MessageBus`]. Two primitives are required:
//!
//! - fire-and-forget [`MessageBus::publish`] onto a named subject
//! - [`MessageBus::queue_subscribe`], where every message on a subject is
//!   handed to exactly one live member of the named group
//!
//! Delivery is at-most-once. A member that dies with a message in hand loses
//! it; nothing is redelivered, acknowledged negatively or dead-lettered.
//!
//! # Backends
//!
//! - [`MemoryBus`] - in-process, used by tests and single-binary setups
//! - [`RedisBus`] - Redis Streams, one consumer group per queue group

pub mod memory;
pub mod streams;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::memory::MemoryBus;
pub use self::streams::{RedisBus, RedisBusConfig};

/// Subject carrying check requests from the coordinator to workers
pub const REQUEST_SUBJECT: &str = "activity-status.request";

/// Subject carrying check responses from workers to the coordinator
pub const RESPONSE_SUBJECT: &str = "activity-status.response";

/// Queue group shared by all probe workers
pub const WORKER_GROUP: &str = "status-workers";

/// Queue group of the coordinator's response subscriber
pub const COORDINATOR_GROUP: &str = "status-coordinators";

// ============================================================================
// Wiring
// ============================================================================

/// Subject and group names handed to every component at construction
///
/// Keeping these out of globals lets tests run isolated buses side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSubjects {
    /// Subject for check requests
    pub request_subject: String,

    /// Subject for check responses
    pub response_subject: String,

    /// Queue group of the worker pool
    pub worker_group: String,

    /// Queue group of the coordinator's response subscriber
    pub coordinator_group: String,
}

impl Default for BusSubjects {
    fn default() -> Self {
        Self {
            request_subject: REQUEST_SUBJECT.to_string(),
            response_subject: RESPONSE_SUBJECT.to_string(),
            worker_group: WORKER_GROUP.to_string(),
            coordinator_group: COORDINATOR_GROUP.to_string(),
        }
    }
}

impl BusSubjects {
    /// Prefix every subject and group, e.g. to isolate test runs
    pub fn with_prefix(prefix: &str) -> Self {
        let base = Self::default();
        Self {
            request_subject: format!("{prefix}.{}", base.request_subject),
            response_subject: format!("{prefix}.{}", base.response_subject),
            worker_group: format!("{prefix}.{}", base.worker_group),
            coordinator_group: format!("{prefix}.{}", base.coordinator_group),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("request_subject", &self.request_subject),
            ("response_subject", &self.response_subject),
            ("worker_group", &self.worker_group),
            ("coordinator_group", &self.coordinator_group),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }

        if self.request_subject == self.response_subject {
            return Err("request and response subjects must differ".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Messages and Subscriptions
// ============================================================================

/// A message handed to one subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text for logging, lossy on invalid UTF-8
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Backend-specific source behind a [`Subscription`]
#[async_trait]
pub trait DeliverySource: Send {
    /// Wait for the next message; `None` once the subscription is closed
    async fn next_delivery(&mut self) -> Option<Delivery>;
}

/// Membership of one queue group on one subject
///
/// Dropping the subscription leaves the group.
pub struct Subscription {
    subject: String,
    group: String,
    source: Box<dyn DeliverySource>,
}

impl Subscription {
    pub fn new(
        subject: impl Into<String>,
        group: impl Into<String>,
        source: Box<dyn DeliverySource>,
    ) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
            source,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Next message delivered to this member
    pub async fn next(&mut self) -> Option<Delivery> {
        self.source.next_delivery().await
    }

    /// Leave the queue group
    pub fn unsubscribe(self) {
        tracing::debug!(subject = %self.subject, group = %self.group, "Unsubscribed");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("group", &self.group)
            .finish()
    }
}

/// Publish/subscribe transport with queue groups
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish without waiting for any consumer
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Join `group` on `subject`; each message goes to exactly one member
    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Transport-level failures
#[derive(Error, Debug)]
pub enum BusError {
    /// Could not reach the bus
    #[error("failed to connect to message bus: {0}")]
    Connect(String),

    /// A publish was rejected or lost
    #[error("failed to publish to '{subject}': {reason}")]
    Publish { subject: String, reason: String },

    /// Joining a queue group failed
    #[error("failed to subscribe to '{subject}' as '{group}': {reason}")]
    Subscribe {
        subject: String,
        group: String,
        reason: String,
    },

    /// The bus has been shut down
    #[error("message bus is closed")]
    Closed,
}
