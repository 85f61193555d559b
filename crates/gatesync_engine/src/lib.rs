//! # gatesync engine
//!
//! One-shot and continuous replication sessions against a sync gateway.
//!
//! This crate provides:
//! - Gateway properties and the command-line sync request
//! - The session configuration builder (URL, direction, filters, pinning)
//! - A replicator that pulls the channel-filtered changes feed into the
//!   local store and pushes local edits back
//! - Session state shared with a supervisor that blocks until the session
//!   ends and then cleans up
//! - HTTP transport plus a scripted mock transport
//!
//! ## Lifecycle
//!
//! 1. Build a [`ReplicatorConfig`] from a [`SyncRequest`] and
//!    [`GatewayProperties`]
//! 2. [`start_session`] registers a status listener and starts the replicator
//! 3. [`SessionSupervisor::run`] waits for `Stopped`, removes the listener
//!    and closes the store
//!
//! ## Key Invariants
//!
//! - Deleted documents never replicate, in either direction
//! - Every session emits exactly one `Stopped` status, and it is the last
//! - Status errors are reported, never raised past the supervisor
//! - No automatic retry

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod listener;
mod pinning;
mod properties;
mod replicator;
mod request;
mod session;
mod supervisor;
mod transport;

pub use config::{skip_deleted, BasicAuthenticator, ReplicationFilter, ReplicatorConfig, ReplicatorType};
pub use error::{
    SyncError, SyncResult, CONFIGURATION_ERROR_CODE, LOCAL_STORE_ERROR_CODE, NETWORK_ERROR_CODE,
    PROTOCOL_ERROR_CODE,
};
pub use http::HttpTransport;
pub use listener::{ListenerToken, ReplicatorChange};
pub use properties::{GatewayProperties, DEFAULT_PROPERTIES_FILE, NO_CERTIFICATE};
pub use replicator::{Replicator, ReplicatorState};
pub use request::SyncRequest;
pub use session::{start_session, start_session_with_transport, SessionHandle, SessionState};
pub use supervisor::{SessionOutcome, SessionSupervisor};
pub use transport::{GatewayTransport, MockTransport};
