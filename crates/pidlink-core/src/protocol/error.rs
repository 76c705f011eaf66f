//! Bridge errors

use thiserror::Error;

/// Errors that can cross the bridge boundary
///
/// Per-line telemetry decode failures are not represented here; see
/// [`crate::telemetry::DecodeError`].
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Open failed: missing, busy, denied, or already open in this process
    #[error("Port unavailable: {port}: {reason}")]
    PortUnavailable {
        /// Port identifier
        port: String,
        /// Driver or registry message
        reason: String,
    },

    /// Read or write failed on an established session
    #[error("I/O failure on {port}: {source}")]
    IoFailure {
        /// Port identifier
        port: String,
        /// Underlying driver error
        #[source]
        source: std::io::Error,
    },

    /// A tuning field did not parse to a finite number
    #[error("Invalid parameter {name}: '{value}' is not a finite number")]
    InvalidParameter {
        /// Field name (`kp`, `ki`, `kd` or `setpoint`)
        name: &'static str,
        /// Text as entered
        value: String,
    },

    /// Command frame could not be written
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Session closed or connection not established
    #[error("Not connected")]
    NotConnected,

    /// `connect` on a live connection
    #[error("Already connected")]
    AlreadyConnected,
}

impl BridgeError {
    /// Whether the error ended the session it happened on
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::IoFailure { .. } | BridgeError::NotConnected)
    }
}
