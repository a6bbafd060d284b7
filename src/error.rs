//! Error types for the device command pipeline.
//!
//! All fallible operations in gesturelink return [`LinkError`]. Each variant
//! carries enough context (operation, device or port name, offending byte
//! values) to debug a physical link from a log line alone.
//!
//! ## Error Categories
//!
//! - **Discovery / Connection**: no matching device, or the channel could not be opened
//! - **Wire Errors**: checksum, header, length and framing-buffer failures on received data
//! - **Send Errors**: oversized payloads, unsupported operations, out-of-range arguments
//! - **Runtime Errors**: timeouts, I/O failures, configuration and task failures
//!
//! ## Receive vs. send policy
//!
//! Wire errors on received data are expected noise. Callers log them and drop
//! the frame; [`LinkError::is_wire_noise`] identifies them:
//!
//! ```rust
//! use gesturelink::LinkError;
//!
//! let error = LinkError::checksum_mismatch("crc-frame", 0xDEADBEEF, 0x12345678);
//! assert!(error.is_wire_noise());
//! assert!(!error.is_retryable());
//! ```
//!
//! ## Recovery
//!
//! ```rust
//! use gesturelink::LinkError;
//!
//! let error = LinkError::connection_failed("/dev/ttyUSB0", "port busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("No device matching {target} found after {attempts} attempt(s)")]
    Discovery { target: String, attempts: u32 },

    #[error("Failed to connect to {device}: {reason}")]
    Connection {
        device: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{protocol} checksum mismatch: received {received:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { protocol: &'static str, received: u32, computed: u32 },

    #[error("{protocol} invalid header: {found:02X?}")]
    InvalidHeader { protocol: &'static str, found: Vec<u8> },

    #[error("{protocol} invalid length: need at least {min} bytes, got {actual}")]
    InvalidLength { protocol: &'static str, min: usize, actual: usize },

    #[error("Frame buffer overflow: frame exceeded {capacity} bytes and was discarded")]
    BufferOverflow { capacity: usize },

    #[error("{protocol} payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { protocol: &'static str, len: usize, max: usize },

    #[error("{operation} is not supported by {device}")]
    UnsupportedOperation { operation: String, device: String },

    #[error("Invalid {argument}: {details}")]
    InvalidArgument { argument: String, details: String },

    #[error("{device} is not connected")]
    NotConnected { device: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("I/O error during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Pipeline task failed: {details}")]
    Task { details: String },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Discovery { .. } => true,
            LinkError::Connection { .. } => true,
            LinkError::Timeout { .. } => true,
            LinkError::Io { .. } => true,
            LinkError::NotConnected { .. } => true,
            LinkError::ChecksumMismatch { .. } => false,
            LinkError::InvalidHeader { .. } => false,
            LinkError::InvalidLength { .. } => false,
            LinkError::BufferOverflow { .. } => false,
            LinkError::PayloadTooLarge { .. } => false,
            LinkError::UnsupportedOperation { .. } => false,
            LinkError::InvalidArgument { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::Task { .. } => false,
        }
    }

    /// Returns whether this error describes corrupted inbound data.
    ///
    /// These are logged and the offending frame dropped; they never stop the pipeline.
    pub fn is_wire_noise(&self) -> bool {
        matches!(
            self,
            LinkError::ChecksumMismatch { .. }
                | LinkError::InvalidHeader { .. }
                | LinkError::InvalidLength { .. }
                | LinkError::BufferOverflow { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Discovery { .. } => vec![
                "Check the USB cable or that the hand is powered and advertising",
                "Specify the serial port or device name explicitly",
                "Increase the number of discovery attempts",
            ],
            LinkError::Connection { .. } => vec![
                "Check TX/RX/GND wiring between adapter and hand",
                "Make sure no other program holds the port",
                "Power-cycle the hand and retry",
            ],
            LinkError::ChecksumMismatch { .. }
            | LinkError::InvalidHeader { .. }
            | LinkError::InvalidLength { .. } => vec![
                "Check baud rate and parity settings",
                "Check for electrical noise on the link",
                "Verify the configured device family matches the hardware",
            ],
            LinkError::BufferOverflow { .. } => vec![
                "Check that the device emits frame delimiters",
                "Verify the configured device family matches the hardware",
            ],
            LinkError::PayloadTooLarge { .. } => vec![
                "Split the payload into several commands",
                "Check the device's maximum packet size",
            ],
            LinkError::UnsupportedOperation { .. } => vec![
                "Query the hand's capabilities before calling device-specific operations",
                "Use a device family that supports this operation",
            ],
            LinkError::InvalidArgument { .. } => vec![
                "Finger indices are 0 (thumb) to 4 (little)",
                "Check the position range of the configured device family",
            ],
            LinkError::NotConnected { .. } => vec![
                "Call connect() before sending commands",
                "Check whether the device dropped the connection",
            ],
            LinkError::Timeout { .. } => vec![
                "Increase the timeout",
                "Check that the device is powered and responding",
            ],
            LinkError::Io { .. } => vec![
                "Check the device is still attached",
                "Check operating system permissions for the port",
            ],
            LinkError::Config { .. } => vec![
                "Check the configuration file against the documented schema",
                "Verify the gesture label file exists and is valid JSON",
            ],
            LinkError::Task { .. } => vec![
                "Check the logs for a panic in the pipeline task",
                "Restart the pipeline",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::Connection { device: device.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        device: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Connection { device: device.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for checksum mismatches.
    pub fn checksum_mismatch(protocol: &'static str, received: u32, computed: u32) -> Self {
        LinkError::ChecksumMismatch { protocol, received, computed }
    }

    /// Helper constructor for operations a device variant does not implement.
    pub fn unsupported(operation: impl Into<String>, device: impl Into<String>) -> Self {
        LinkError::UnsupportedOperation { operation: operation.into(), device: device.into() }
    }

    /// Helper constructor for out-of-range arguments.
    pub fn invalid_argument(argument: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::InvalidArgument { argument: argument.into(), details: details.into() }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Io { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Config { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io { context: "<unknown>".to_string(), source: err }
    }
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkError::Connection {
            device: "serial port".to_string(),
            reason: err.description.clone(),
            source: Some(Box::new(err)),
        }
    }
}
