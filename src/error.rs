//! Custom error types for the application.
//!
//! This module defines the primary error type, `BrailleError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failures that can occur between the host and
//! the display device.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidPort`**: a connect attempt was made with no port selected.
//! - **`ConnectionFailure`**: the serial port could not be opened or the
//!   reset handshake failed; wraps the underlying I/O error.
//! - **`NotConnected`**: a command was issued while no connection is open.
//! - **`SendFailure`**: a command write failed on an open connection; wraps
//!   the underlying I/O error. Transient write failures are never retried
//!   automatically: the device's physical state cannot be assumed after a
//!   failed write, so recovery requires a user-initiated reconnect.
//! - **`PatternFormat`**: a dot-pattern string is not exactly six binary
//!   digits. Malformed patterns are rejected before any angle conversion.
//! - **`EmptyInput`**: a send was requested with no text.
//! - **`Configuration`**: a semantic fault in the persisted settings (an
//!   unknown key or an unparsable value), as opposed to a file-level fault.
//! - **`Io`** / **`Config`**: file and JSON faults of the settings store.
//!
//! Unrecognized telemetry lines are NOT errors: the parser classifies them
//! as [`crate::telemetry::TelemetryEvent::Unrecognized`] and the pipeline
//! ignores them, since the device mixes free-form diagnostics onto the same
//! channel.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BrailleError>;

/// Errors surfaced by the transport, codec, pipeline, and settings store.
#[derive(Error, Debug)]
pub enum BrailleError {
    #[error("No port selected")]
    InvalidPort,

    #[error("Failed to connect to '{port}': {source}")]
    ConnectionFailure {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not connected to device")]
    NotConnected,

    #[error("Failed to send command: {0}")]
    SendFailure(#[source] std::io::Error),

    #[error("Malformed braille pattern '{0}': expected exactly six binary digits")]
    PatternFormat(String),

    #[error("Empty text")]
    EmptyInput,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file error: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failure_reports_port_and_cause() {
        let err = BrailleError::ConnectionFailure {
            port: "/dev/ttyUSB0".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyUSB0"));
        assert!(msg.contains("no such device"));
    }

    #[test]
    fn pattern_format_includes_offending_string() {
        let err = BrailleError::PatternFormat("10x000".to_string());
        assert!(err.to_string().contains("10x000"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BrailleError = io.into();
        assert!(matches!(err, BrailleError::Io(_)));
    }
}
