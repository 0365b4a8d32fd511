//! Error types and handling.

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum PtpError {
    /// Inbound byte stream desynchronized from packet framing
    #[error("Framing error: {0}")]
    Framing(String),

    /// Camera answered a command with an error response code
    #[error("Command request failed with response code {0:#06x}")]
    CommandRequestFailed(u16),

    /// Operation is not in the device's advertised operation set
    #[error("Operation not supported by device")]
    OperationNotSupported,

    /// Requested device property could not be resolved
    #[error("Device property not found: {0}")]
    PropertyNotFound(String),

    /// No captured object appeared within the capture window
    #[error("No object appeared after capture")]
    ObjectNotFound,

    /// Value cannot be encoded for the connected camera
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Control or event channel could not be opened
    #[error("Failed to create streams to host")]
    FailedToCreateStreamsToHost,

    /// Connection dropped while a request was outstanding
    #[error("Socket closed")]
    SocketClosed,

    /// Camera already has a control session with another client
    #[error("Another session is already open")]
    AnotherSessionOpen,

    /// Bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Camera sent a packet that does not fit the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PtpError
pub type Result<T> = std::result::Result<T, PtpError>;

impl PtpError {
    /// Create a framing error with message
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Create an invalid response error with message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid payload error with message
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a timeout error with message
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Connect-handshake failures that warrant another attempt
    pub(crate) fn is_retriable_connect(&self) -> bool {
        matches!(self, Self::AnotherSessionOpen | Self::OperationNotSupported)
    }
}
