//! Status transition policy
//!
//! Every correlated check response becomes one [`StatusUpdate`]:
//!
//! | field          | rule                                               |
//! |----------------|----------------------------------------------------|
//! | `status`       | always set, last write wins                        |
//! | `last_updated` | always set to `checked_at`, last write wins        |
//! | `last_active`  | set to `checked_at` on ACTIVE, last write wins     |
//!
//! All four states (unset, ACTIVE, INACTIVE, ERRORED) reach each other; no
//! state is terminal.

use chrono::{DateTime, Utc};

use crate::models::{InstanceRecord, InstanceStatus};
use crate::protocol::CheckResponse;

/// Field-level update applied to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: InstanceStatus,
    pub last_updated: DateTime<Utc>,
    /// Present only when `status` is ACTIVE
    pub last_active: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn new(status: InstanceStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status,
            last_updated: checked_at,
            last_active: status.is_active().then_some(checked_at),
        }
    }

    pub fn from_response(response: &CheckResponse) -> Self {
        Self::new(response.status, response.checked_at)
    }

    /// Apply to an in-memory record with the same semantics every store uses
    pub fn apply_to(&self, record: &mut InstanceRecord) {
        record.status = Some(self.status);
        record.last_updated = Some(self.last_updated);

        if let Some(seen) = self.last_active {
            record.last_active = Some(seen);
        }
    }
}

impl From<&CheckResponse> for StatusUpdate {
    fn from(response: &CheckResponse) -> Self {
        Self::from_response(response)
    }
}
