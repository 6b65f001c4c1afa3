//! Unified error handling for the activity-status crate
//!
//! Each subsystem keeps its own error type ([`BusError`], [`StoreError`],
//! [`CodecError`], [`ProbeError`], [`ConfigError`]). [`Error`] wraps them for
//! the wiring code, and every type reports a category and whether retrying
//! can help, which the long-running loops attach to their log lines.
//!
//! # Architecture
//!
//! - [`StatusErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use activity_status::error::{StatusErrorTrait, StoreError};
//!
//! fn log_store_error(err: &StoreError) {
//!     tracing::error!(
//!         error = %err,
//!         category = %err.category(),
//!         recoverable = err.is_recoverable(),
//!         "Store call failed"
//!     );
//! }
//! ```

use thiserror::Error;

pub use crate::bus::BusError;
pub use crate::config::ConfigError;
pub use crate::prober::ProbeError;
pub use crate::protocol::CodecError;
pub use crate::store::StoreError;

/// Common trait for all activity-status error types
pub trait StatusErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Message bus connectivity and delivery
    Bus,
    /// State store access
    Storage,
    /// Payload encoding and decoding
    Codec,
    /// Outbound HTTP probing
    Network,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Storage => "storage",
            Self::Codec => "codec",
            Self::Network => "network",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StatusErrorTrait for BusError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Bus
    }
}

impl StatusErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Query { .. } => true,
            Self::InvalidRecord { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl StatusErrorTrait for CodecError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Codec
    }
}

impl StatusErrorTrait for ConfigError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Config
    }
}

impl StatusErrorTrait for ProbeError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

/// Unified error type for the activity-status crate
#[derive(Error, Debug)]
pub enum Error {
    /// Message bus errors
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// State store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Wire payload errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Prober construction errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl StatusErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Bus(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Codec(e) => e.is_recoverable(),
            Self::Probe(e) => e.is_recoverable(),
            Self::Config(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Bus(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Codec(e) => e.category(),
            Self::Probe(e) => e.category(),
            Self::Config(e) => e.category(),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
