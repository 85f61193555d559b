//! # gatesync protocol
//!
//! Wire types for the sync gateway REST API and the status types the
//! replicator reports.
//!
//! This crate provides:
//! - `Document` and `DocumentFlags`, the inputs of replication filters
//! - Changes feed and `_bulk_docs` messages with JSON codecs
//! - `ReplicatorStatus` snapshots (activity, error, progress)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod messages;
mod status;

pub use document::{Document, DocumentFlags};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    BulkDocsRequest, BulkDocsResult, ChangeEntry, ChangesRequest, ChangesResponse,
    GatewayErrorBody, RevisionRef, Sequence, CHANNEL_FILTER,
};
pub use status::{ActivityLevel, Progress, ReplicatorStatus, SessionError};
