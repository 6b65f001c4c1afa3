//! Bus message schemas for the check round trip
//!
//! A health check is one logical round trip split across two independent
//! publish/subscribe exchanges:
//!
//! ```text
//! coordinator ──CheckRequest──▶ activity-status.request  ──▶ worker (queue group)
//! coordinator ◀─CheckResponse── activity-status.response ◀── worker
//! ```
//!
//! Nothing at the transport level ties a response to its request. The
//! instance id copied from request to response is the only correlation key,
//! so both messages are validated here before anything downstream trusts them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{InstanceId, InstanceStatus};

/// Errors raised at the serialization boundary
#[derive(Error, Debug)]
pub enum CodecError {
    /// Payload is not valid JSON for the expected message
    #[error("malformed {message} payload: {source}")]
    Malformed {
        message: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Payload parsed but a required field is empty or out of range
    #[error("invalid {message}: {reason}")]
    Invalid {
        message: &'static str,
        reason: String,
    },

    /// Message could not be serialized
    #[error("failed to encode {message}: {source}")]
    Encode {
        message: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Common encode/decode behaviour for bus payloads
pub trait BusMessage: Serialize + DeserializeOwned {
    /// Human readable name used in logs and errors
    const NAME: &'static str;

    /// Field-level checks that serde cannot express
    fn validate(&self) -> Result<(), String>;

    /// Serialize to the JSON wire format
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|source| CodecError::Encode {
            message: Self::NAME,
            source,
        })
    }

    /// Parse and validate a JSON payload
    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let message: Self =
            serde_json::from_slice(payload).map_err(|source| CodecError::Malformed {
                message: Self::NAME,
                source,
            })?;

        message.validate().map_err(|reason| CodecError::Invalid {
            message: Self::NAME,
            reason,
        })?;

        Ok(message)
    }
}

/// Request for one worker to probe one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub id: InstanceId,
    pub host: String,
    pub port: u16,
}

impl BusMessage for CheckRequest {
    const NAME: &'static str = "check request";

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Probe outcome for one instance, correlated by `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub id: InstanceId,
    pub status: InstanceStatus,
    /// Taken by the worker when the probe completed (RFC 3339 on the wire)
    pub checked_at: DateTime<Utc>,
}

impl CheckResponse {
    /// Response for a probe that finished just now
    pub fn now(id: InstanceId, status: InstanceStatus) -> Self {
        Self {
            id,
            status,
            checked_at: Utc::now(),
        }
    }
}

impl BusMessage for CheckResponse {
    const NAME: &'static str = "check response";

    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("id must not be empty".to_string());
        }
        Ok(())
    }
}
