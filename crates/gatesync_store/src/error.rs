//! Error types for local store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while opening, reading, writing or closing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the log.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current log size.
        size: u64,
    },

    /// Another process holds the store directory lock.
    #[error("store at {0} is locked by another process")]
    Locked(PathBuf),

    /// The store path exists but cannot be used as a store directory.
    #[error("invalid store path {path}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// The log contains a damaged record.
    #[error("store corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the damaged record.
        offset: u64,
        /// Description of the damage.
        reason: String,
    },

    /// A record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(String),

    /// The store handle is not open.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
