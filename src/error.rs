//! Custom error types for the application.
//!
//! This module defines the primary error type, `RowError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur while acquiring telemetry, from a missing wireless
//! stack to configuration problems.
//!
//! ## Error Hierarchy
//!
//! `RowError` consolidates the following sources:
//!
//! - **`CapabilityUnavailable`**: The host has no usable wireless stack. Surfaced to the
//!   user as-is and never retried automatically.
//! - **`ConnectFailure`**: Device not found, rejected, handshake error or a drop in the
//!   middle of the handshake. The connection reverts to `Disconnected` and the message is
//!   retained until the next user action.
//! - **`Teardown`**: Unsubscribe/close failed. These are only ever logged; disconnect and
//!   source switching never return them.
//! - **`Config`** / **`Configuration`**: Parsing failures from `figment` and semantic
//!   validation failures respectively.
//! - **`Serialization`**: `serde_json` failures while encoding summaries.
//!
//! Decoding never fails: a truncated frame simply yields fewer fields, so there is no
//! decoder variant here.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RowError>;

/// Primary error type for the rowing telemetry core.
#[derive(Error, Debug)]
pub enum RowError {
    /// Required wireless API is absent on this host.
    #[error("{0}")]
    CapabilityUnavailable(String),

    /// Connection attempt failed before the link became usable.
    #[error("{0}")]
    ConnectFailure(String),

    /// Best-effort release of a subscription or link failed.
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// JSON encoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RowError {
    /// Whether a later user-initiated retry can reasonably succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            RowError::ConnectFailure(_) | RowError::Teardown(_) => true,
            RowError::CapabilityUnavailable(_)
            | RowError::Config(_)
            | RowError::Configuration(_)
            | RowError::Serialization(_) => false,
        }
    }
}

impl From<figment::Error> for RowError {
    fn from(value: figment::Error) -> Self {
        RowError::Config(Box::new(value))
    }
}
