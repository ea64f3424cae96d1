//! Error handling for gcodestream
//!
//! Provides error types for all layers of the streaming stack:
//! - Connection errors (transport unreachable or misconfigured)
//! - Controller errors (operations attempted in an invalid state)
//! - Firmware errors (unparseable or unsupported protocol traffic)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Raised synchronously from the controller call that violated a precondition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Operation attempted in a state that does not allow it
    #[error("Controller not ready: {reason}")]
    NotReady {
        /// Why the controller refused the operation.
        reason: String,
    },

    /// A stream is already queued or running
    #[error("A stream is already active")]
    StreamAlreadyActive,

    /// `begin_streaming` called without a queued command source
    #[error("No stream has been queued")]
    NoStreamQueued,

    /// The firmware is in alarm and needs an explicit unlock or reset
    #[error("Controller is in alarm state, unlock or reset required")]
    AlarmActive,

    /// An argument is out of range
    #[error("Invalid {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The explicit command queue reached its configured capacity
    #[error("Command queue is full ({capacity} commands)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The firmware acknowledged more commands than were outstanding
    #[error("Flow control violation: {acknowledged} acknowledgements for {outstanding} outstanding commands")]
    FlowControlViolation {
        /// Acknowledgements received.
        acknowledged: usize,
        /// Commands that were outstanding at the time.
        outstanding: usize,
    },
}

impl ControllerError {
    /// Shorthand for [`ControllerError::NotReady`]
    pub fn not_ready(reason: impl Into<String>) -> Self {
        ControllerError::NotReady {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ControllerError::InvalidParameter`]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ControllerError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Connection error type
///
/// Represents errors related to the physical link with the controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// The port is already open
    #[error("Connection already open on {port}")]
    AlreadyOpen {
        /// The port that is already open.
        port: String,
    },

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Firmware error type
///
/// Represents errors specific to firmware protocols.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FirmwareError {
    /// Response parsing error
    #[error("Failed to parse firmware response: {reason}")]
    ResponseParseError {
        /// The reason the response parsing failed.
        reason: String,
    },

    /// Unsupported feature
    #[error("Feature not supported by {firmware}: {feature}")]
    UnsupportedFeature {
        /// The firmware that does not support the feature.
        firmware: String,
        /// The unsupported feature name.
        feature: String,
    },
}

impl FirmwareError {
    /// Shorthand for [`FirmwareError::ResponseParseError`]
    pub fn parse(reason: impl Into<String>) -> Self {
        FirmwareError::ResponseParseError {
            reason: reason.into(),
        }
    }
}

/// Main error type for gcodestream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if this is a "not ready" precondition failure
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Error::Controller(
                ControllerError::NotReady { .. }
                    | ControllerError::StreamAlreadyActive
                    | ControllerError::NoStreamQueued
                    | ControllerError::AlarmActive
            )
        )
    }

    /// Check if this is a firmware error
    pub fn is_firmware_error(&self) -> bool {
        matches!(self, Error::Firmware(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
