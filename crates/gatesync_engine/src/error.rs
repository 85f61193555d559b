//! Error types for the replication engine.

use gatesync_protocol::{ProtocolError, SessionError};
use gatesync_store::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Status error code for network and TLS failures.
pub const NETWORK_ERROR_CODE: i32 = 1;
/// Status error code for malformed gateway responses.
pub const PROTOCOL_ERROR_CODE: i32 = 2;
/// Status error code for local store failures.
pub const LOCAL_STORE_ERROR_CODE: i32 = 3;
/// Status error code for configuration problems and misuse.
pub const CONFIGURATION_ERROR_CODE: i32 = 4;

/// Errors that can occur while configuring or running replication.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The pinned certificate could not be read.
    #[error("cannot load pinned certificate {path:?}: {source}")]
    CertificateLoad {
        /// Configured certificate path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The local store failed.
    #[error("local store error: {0}")]
    LocalStore(#[from] StoreError),

    /// The gateway answered with a non-success status.
    #[error("gateway returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Lower-case reason phrase, e.g. `"unauthorized"`.
        message: String,
    },

    /// The gateway could not be reached.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The gateway sent something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the code reported in status snapshots for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            SyncError::Http { status, .. } => i32::from(*status),
            SyncError::Transport { .. } => NETWORK_ERROR_CODE,
            SyncError::Protocol(_) => PROTOCOL_ERROR_CODE,
            SyncError::LocalStore(_) => LOCAL_STORE_ERROR_CODE,
            SyncError::Configuration(_)
            | SyncError::CertificateLoad { .. }
            | SyncError::InvalidStateTransition { .. } => CONFIGURATION_ERROR_CODE,
        }
    }

    /// Returns true if the endpoint was unreachable rather than refusing us.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }

    /// Converts the error into the form carried by status snapshots.
    #[must_use]
    pub fn to_session_error(&self) -> SessionError {
        let message = match self {
            SyncError::Http { message, .. } => message.clone(),
            other => other.to_string(),
        };
        SessionError::new(message, self.code())
    }
}
