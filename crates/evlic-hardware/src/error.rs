//! Error types for reader and card operations.
//!
//! This module defines the failures a reader session can report, from a
//! missing device through command timeouts to block-level read and write
//! failures. Decode degradation is not an error and never appears here.

use evlic_core::BlockIndex;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during reader and card operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No supported reader was found during a scan.
    #[error("No supported reader found: {detail}")]
    DeviceNotFound { detail: String },

    /// An operation needs an open reader session and none exists.
    #[error("No reader session is open")]
    NoDevice,

    /// A command/response exchange exceeded its deadline.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// An explicit card operation found no card in the field.
    #[error("No card present")]
    NoCardPresent,

    /// Reading a memory block failed.
    #[error("Block {block} read failed: {message}")]
    BlockRead { block: BlockIndex, message: String },

    /// Writing a memory block failed.
    #[error("Block {block} write failed: {message}")]
    BlockWrite { block: BlockIndex, message: String },

    /// Lower-level I/O fault. The session is unusable afterwards.
    #[error("Device I/O error: {message}")]
    DeviceIo { message: String },

    /// The reader answered with something that could not be interpreted.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Operation is not supported by this reader or card.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Card data could not be encoded or had an invalid shape.
    #[error(transparent)]
    Codec(#[from] evlic_core::Error),
}

impl HardwareError {
    /// Create a new device-not-found error.
    pub fn device_not_found(detail: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            detail: detail.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new block read error.
    pub fn block_read(block: BlockIndex, message: impl Into<String>) -> Self {
        Self::BlockRead {
            block,
            message: message.into(),
        }
    }

    /// Create a new block write error.
    pub fn block_write(block: BlockIndex, message: impl Into<String>) -> Self {
        Self::BlockWrite {
            block,
            message: message.into(),
        }
    }

    /// Create a new device I/O error.
    pub fn device_io(message: impl Into<String>) -> Self {
        Self::DeviceIo {
            message: message.into(),
        }
    }

    /// Create a new invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns `true` if the session must be closed and reopened.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceIo { .. } | Self::NoDevice)
    }
}

impl From<tokio::task::JoinError> for HardwareError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::device_io(format!("reader I/O task failed: {err}"))
    }
}
