//! Request fan-out
//!
//! One check request per instance record, published fire-and-forget. A
//! failure for one instance is logged and counted; the rest of the batch is
//! still published.

use std::sync::Arc;

use crate::bus::MessageBus;
use crate::error::StatusErrorTrait;
use crate::metrics;
use crate::models::InstanceRecord;
use crate::protocol::BusMessage;

/// Outcome of publishing one batch of requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.published + self.failed
    }
}

/// Publishes check requests onto the request subject
#[derive(Clone)]
pub struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    subject: String,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn MessageBus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Publish one request per record, in order
    pub async fn dispatch(&self, instances: &[InstanceRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for instance in instances {
            let request = instance.check_request();

            let payload = match request.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(instance_id = %instance.id, error = %e, "Skipping instance");
                    report.failed += 1;
                    continue;
                }
            };

            match self.bus.publish(&self.subject, payload).await {
                Ok(()) => {
                    tracing::debug!(
                        instance_id = %request.id,
                        address = %instance.address(),
                        "Published check request"
                    );
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        instance_id = %request.id,
                        subject = %self.subject,
                        error = %e,
                        recoverable = e.is_recoverable(),
                        "Failed to publish check request"
                    );
                    metrics::record_publish_error(&self.subject);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
