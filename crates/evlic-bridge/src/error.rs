//! Error types for the request bridge.

use evlic_hardware::HardwareError;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to the UI collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Reader or card failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Payload could not be encoded for the card.
    #[error(transparent)]
    Codec(#[from] evlic_core::Error),

    /// Configuration could not be loaded or is out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request named no known operation.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// The request payload had the wrong shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl BridgeError {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable machine-readable code for the IPC layer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hardware(e) => match e {
                HardwareError::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
                HardwareError::NoDevice => "NO_DEVICE",
                HardwareError::Timeout { .. } => "TIMEOUT",
                HardwareError::NoCardPresent => "NO_CARD_PRESENT",
                HardwareError::BlockRead { .. } => "BLOCK_READ",
                HardwareError::BlockWrite { .. } => "BLOCK_WRITE",
                HardwareError::DeviceIo { .. } => "DEVICE_IO",
                HardwareError::InvalidResponse { .. } => "INVALID_RESPONSE",
                HardwareError::Unsupported { .. } => "UNSUPPORTED",
                HardwareError::Codec(_) => "CODEC",
            },
            Self::Codec(_) => "CODEC",
            Self::Config(_) => "CONFIG",
            Self::UnknownOperation(_) => "UNKNOWN_OPERATION",
            Self::InvalidRequest(_) | Self::Json(_) => "INVALID_REQUEST",
        }
    }

    /// Returns `true` when the reader session is gone and a device refresh
    /// is needed.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Hardware(e) if e.is_fatal())
    }
}
