//! Error types for the assembly station.
//!
//! This module defines `StationError`, the typed error shared by every crate in
//! the workspace. Driver seams speak `anyhow::Result` (see [`crate::capabilities`]);
//! each layer converts those failures into a `StationError` with the device or
//! pin context attached before passing them upward.
//!
//! ## Error Categories
//!
//! - **Configuration**: missing devices, graphs or named positions. Surfaced as
//!   typed invalid results, never as a crash.
//! - **Connectivity**: a device is not connected. Checked before every motion.
//! - **Timeout**: slide confirmation, measurement acquisition, input wait.
//!   Always carries the elapsed and limit durations.
//! - **Cancellation**: cooperative; callers attempt a recovery move first.
//! - **Internal**: anything unexpected, including panics caught at the command
//!   boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the station error type.
pub type StationResult<T> = std::result::Result<T, StationError>;

/// Coarse classification of a [`StationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or inconsistent configuration
    Configuration,
    /// Device not connected or unreachable
    Connectivity,
    /// Operation exceeded its time limit
    Timeout,
    /// Cooperative cancellation or abort
    Cancellation,
    /// Device, I/O or measurement failure reported by a collaborator
    Hardware,
    /// Unexpected internal failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancellation => "cancellation",
            ErrorKind::Hardware => "hardware",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for the station core.
#[derive(Error, Debug)]
pub enum StationError {
    /// Configuration is missing or semantically invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A device id was referenced that the station does not know about.
    #[error("Device '{0}' is not configured")]
    DeviceNotConfigured(String),

    /// The device exists but reports itself disconnected.
    #[error("Device '{0}' is not connected")]
    NotConnected(String),

    /// An operation exceeded its time limit.
    #[error("{operation} timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// Human-readable operation label
        operation: String,
        /// Time spent before giving up
        elapsed: Duration,
        /// Configured limit
        limit: Duration,
    },

    /// The operation was cancelled or aborted.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A motion command failed at the device.
    #[error("Motion error on '{device}': {message}")]
    Motion {
        /// Device that failed
        device: String,
        /// Driver message
        message: String,
    },

    /// A digital I/O operation failed.
    #[error("Digital I/O error on '{device}.{pin}': {message}")]
    Io {
        /// I/O board name
        device: String,
        /// Pin name
        pin: String,
        /// Failure description
        message: String,
    },

    /// Measurement acquisition failed.
    #[error("Measurement error on channel '{channel}': {message}")]
    Measurement {
        /// Channel name
        channel: String,
        /// Failure description
        message: String,
    },

    /// Image capture failed.
    #[error("Imaging error on camera '{camera}': {message}")]
    Imaging {
        /// Camera name
        camera: String,
        /// Failure description
        message: String,
    },

    /// Parameters failed validation.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Lifecycle call made from a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Persisting data failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A step of a sequence failed; carries the step's own classification.
    #[error("Step {index} '{name}' failed: {message}")]
    StepFailed {
        /// One-based step index
        index: usize,
        /// Step command name
        name: String,
        /// Step result message
        message: String,
        /// Classification of the step failure
        kind: ErrorKind,
    },

    /// Unexpected failure, including panics caught at a command boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StationError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StationError::Configuration(_)
            | StationError::DeviceNotConfigured(_)
            | StationError::InvalidParameters(_) => ErrorKind::Configuration,
            StationError::NotConnected(_) => ErrorKind::Connectivity,
            StationError::Timeout { .. } => ErrorKind::Timeout,
            StationError::Cancelled(_) => ErrorKind::Cancellation,
            StationError::Motion { .. }
            | StationError::Io { .. }
            | StationError::Measurement { .. }
            | StationError::Imaging { .. }
            | StationError::Storage(_) => ErrorKind::Hardware,
            StationError::StepFailed { kind, .. } => *kind,
            StationError::InvalidState(_) | StationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when this error represents cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Build a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration, limit: Duration) -> Self {
        StationError::Timeout {
            operation: operation.into(),
            elapsed,
            limit,
        }
    }

    /// Wrap a driver failure for `device`.
    pub fn motion(device: impl fmt::Display, err: impl fmt::Display) -> Self {
        StationError::Motion {
            device: device.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap an I/O failure for `device.pin`.
    pub fn io(device: impl Into<String>, pin: impl Into<String>, message: impl Into<String>) -> Self {
        StationError::Io {
            device: device.into(),
            pin: pin.into(),
            message: message.into(),
        }
    }

    /// Wrap a measurement failure for `channel`.
    pub fn measurement(channel: impl Into<String>, message: impl Into<String>) -> Self {
        StationError::Measurement {
            channel: channel.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for StationError {
    fn from(err: anyhow::Error) -> Self {
        StationError::Internal(format!("{:#}", err))
    }
}

impl From<std::io::Error> for StationError {
    fn from(err: std::io::Error) -> Self {
        StationError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            StationError::NotConnected("gantry".into()).kind(),
            ErrorKind::Connectivity
        );
        assert_eq!(
            StationError::timeout("slide", Duration::from_secs(10), Duration::from_secs(10)).kind(),
            ErrorKind::Timeout
        );
        let step = StationError::StepFailed {
            index: 2,
            name: "move".into(),
            message: "boom".into(),
            kind: ErrorKind::Timeout,
        };
        assert_eq!(step.kind(), ErrorKind::Timeout);
        assert!(StationError::Cancelled("x".into()).is_cancelled());
    }

    #[test]
    fn test_timeout_message_includes_durations() {
        let err = StationError::timeout(
            "Wait for input 'door'",
            Duration::from_millis(30_050),
            Duration::from_secs(30),
        );
        let text = err.to_string();
        assert!(text.contains("Wait for input 'door'"));
        assert!(text.contains("30s"));
    }

    #[test]
    fn test_anyhow_conversion_keeps_chain() {
        let inner = anyhow::anyhow!("serial port closed").context("reading position");
        let err: StationError = inner.into();
        let text = err.to_string();
        assert!(text.contains("reading position"));
        assert!(text.contains("serial port closed"));
    }
}
