//! Error types for the instrument drivers.
//!
//! This module defines `DriverError`, the single error type returned by every
//! driver operation. It is built with `thiserror` and mirrors the way a SCPI
//! exchange can go wrong:
//!
//! - **`Connection`**: the transport session could not be opened (address
//!   unreachable, VISA resource missing, connect timeout).
//! - **`Communication`**: a write or read failed on a session that was open.
//! - **`Timeout`**: the instrument did not answer within the configured window.
//! - **`Parse`**: a reply arrived but could not be turned into the expected
//!   value (malformed block header, non-numeric ASCII, truncated payload).
//! - **`InvalidParameter`**: a typed argument was rejected before anything was
//!   sent to the instrument.
//! - **`NotConnected`**: I/O was attempted on a session that was already closed.
//! - **`Config`**: configuration loading or validation failed.
//! - **`FeatureNotEnabled`**: the requested transport was not compiled in.
//!
//! None of these are recovered locally: drivers return them to the caller
//! unchanged.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for results using the driver error type.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors produced by transports, sessions and instrument drivers.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The transport session could not be opened.
    #[error("Failed to connect to '{resource}': {message}")]
    Connection {
        /// Resource address that was being opened.
        resource: String,
        /// Underlying failure.
        message: String,
    },

    /// A write or read failed on an open session.
    #[error("Communication error on '{resource}': {message}")]
    Communication {
        /// Resource address of the session.
        resource: String,
        /// Underlying failure.
        message: String,
    },

    /// No reply arrived within the configured window.
    #[error("Timed out after {timeout:?} waiting on '{command}'")]
    Timeout {
        /// Command whose reply (or transmission) timed out.
        command: String,
        /// Window that elapsed.
        timeout: Duration,
    },

    /// A reply could not be parsed.
    #[error("Failed to parse instrument reply: {0}")]
    Parse(String),

    /// A typed argument was rejected before anything was sent.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O was attempted after the session was closed.
    #[error("Instrument '{0}' is not connected")]
    NotConnected(String),

    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transport was requested that was not compiled in.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl DriverError {
    pub(crate) fn connection(resource: &str, message: impl ToString) -> Self {
        Self::Connection {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn communication(resource: &str, message: impl ToString) -> Self {
        Self::Communication {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns `true` for [`DriverError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::communication("TCPIP0::10.0.0.2::INSTR", "broken pipe");
        assert_eq!(
            err.to_string(),
            "Communication error on 'TCPIP0::10.0.0.2::INSTR': broken pipe"
        );
    }

    #[test]
    fn test_timeout_display_names_command() {
        let err = DriverError::Timeout {
            command: "*IDN?".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("*IDN?"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_feature_not_enabled_hint() {
        let err = DriverError::FeatureNotEnabled("instrument_visa".into());
        assert!(err.to_string().contains("--features instrument_visa"));
        assert!(!err.is_timeout());
    }
}
