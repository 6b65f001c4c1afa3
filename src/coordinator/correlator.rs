//! Response correlation
//!
//! Check responses arrive on their own subject with no link to the request
//! that caused them beyond the embedded instance id. Each one is decoded,
//! turned into a [`StatusUpdate`] and applied to the record with that id.
//! The coordinator is the only writer of instance status.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::{BusError, BusSubjects, MessageBus, Subscription};
use crate::error::StatusErrorTrait;
use crate::metrics;
use crate::models::InstanceId;
use crate::protocol::{BusMessage, CheckResponse};
use crate::store::{InstanceStore, StatusUpdate, UpdateOutcome};

/// What happened to one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// The record was updated
    Updated(InstanceId),

    /// No record has this id; nothing was written
    NotFound(InstanceId),

    /// The payload could not be decoded; nothing was written
    Dropped,

    /// The store rejected the update
    StoreFailed(InstanceId),
}

impl CorrelationOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated(_) => "updated",
            Self::NotFound(_) => "not_found",
            Self::Dropped => "decode_error",
            Self::StoreFailed(_) => "store_error",
        }
    }
}

/// Applies check responses to the instance store
#[derive(Clone)]
pub struct ResponseCorrelator {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn InstanceStore>,
    subjects: BusSubjects,
}

impl ResponseCorrelator {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn InstanceStore>,
        subjects: BusSubjects,
    ) -> Self {
        Self {
            bus,
            store,
            subjects,
        }
    }

    /// Join the coordinator group on the response subject
    pub async fn subscribe(&self) -> Result<Subscription, BusError> {
        self.bus
            .queue_subscribe(
                &self.subjects.response_subject,
                &self.subjects.coordinator_group,
            )
            .await
    }

    /// Decode one response and apply it
    pub async fn handle_payload(&self, payload: &[u8]) -> CorrelationOutcome {
        let response = match CheckResponse::decode(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    category = %e.category(),
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping undecodable check response"
                );
                metrics::record_decode_error(&self.subjects.response_subject);
                metrics::record_response(CorrelationOutcome::Dropped.label());
                return CorrelationOutcome::Dropped;
            }
        };

        let update = StatusUpdate::from(&response);
        match self.store.update_status(&response.id, &update).await {
            Ok(UpdateOutcome::Updated) => {
                tracing::info!(
                    instance_id = %response.id,
                    status = %response.status,
                    checked_at = %response.checked_at,
                    "Instance status updated"
                );
                metrics::record_update_outcome(UpdateOutcome::Updated);
                CorrelationOutcome::Updated(response.id)
            }
            Ok(UpdateOutcome::NotFound) => {
                tracing::warn!(
                    instance_id = %response.id,
                    status = %response.status,
                    "No instance matches check response"
                );
                metrics::record_update_outcome(UpdateOutcome::NotFound);
                CorrelationOutcome::NotFound(response.id)
            }
            Err(e) => {
                tracing::error!(
                    instance_id = %response.id,
                    error = %e,
                    category = %e.category(),
                    recoverable = e.is_recoverable(),
                    "Failed to update instance status"
                );
                let outcome = CorrelationOutcome::StoreFailed(response.id);
                metrics::record_response(outcome.label());
                outcome
            }
        }
    }

    /// Apply responses until the subscription closes or shutdown is signalled
    pub async fn run(&self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            subject = %subscription.subject(),
            group = %subscription.group(),
            "Response correlator started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                delivery = subscription.next() => {
                    match delivery {
                        Some(delivery) => {
                            self.handle_payload(&delivery.payload).await;
                        }
                        None => {
                            tracing::warn!("Response subscription closed");
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
        tracing::info!("Response correlator shutting down");
    }
}
