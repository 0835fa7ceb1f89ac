//! Error taxonomy

use thiserror::Error;

/// Register-protocol failure talking to one device: refused connection,
/// IO error, timeout, exception response or malformed reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device {host}: {message}")]
pub struct DeviceCommunicationError {
    pub host: String,
    pub message: String,
}

impl DeviceCommunicationError {
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            message: message.into(),
        }
    }
}

/// Grid meter HTTP failure. Never escapes the meter adapter.
#[derive(Debug, Error)]
pub enum MeterUnavailableError {
    #[error("meter request failed: {0}")]
    Transport(String),

    #[error("meter answered HTTP {0}")]
    Status(u16),

    #[error("meter response malformed: {0}")]
    Decode(String),
}

/// OCPP message that cannot be answered with a CALL_RESULT.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcppError {
    #[error("malformed message: {0}")]
    Frame(String),

    #[error("{action} payload could not be decoded: {reason}")]
    Decode { action: String, reason: String },

    #[error("{action} response could not be encoded: {reason}")]
    Encode { action: String, reason: String },

    #[error("action {0} is not supported")]
    UnsupportedAction(String),
}

impl OcppError {
    /// OCPP-J error code sent back in the CALL_ERROR.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Frame(_) | Self::Decode { .. } | Self::Encode { .. } => "InternalError",
            Self::UnsupportedAction(_) => "NotSupported",
        }
    }
}
