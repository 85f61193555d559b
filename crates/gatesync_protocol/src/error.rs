//! Error types for decoding gateway messages.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or interpreting gateway payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON for the expected message.
    #[error("malformed gateway payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but violates the message contract.
    #[error("invalid gateway message: {0}")]
    Invalid(String),
}

impl ProtocolError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
