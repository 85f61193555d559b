//! The sync command: one replication session from start to cleanup.

use gatesync_engine::{
    start_session, GatewayProperties, ReplicatorConfig, SessionOutcome, SessionSupervisor,
    SyncError, SyncRequest,
};
use gatesync_protocol::SessionError;
use gatesync_store::LocalStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Why a sync run failed.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The session could not be configured or started.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The session ran and ended with an error status.
    #[error("replication ended with error: {0}")]
    Session(SessionError),
}

/// Options collected from the command line.
#[derive(Debug)]
pub struct SyncOptions {
    /// Credentials and channels.
    pub request: SyncRequest,
    /// Properties file.
    pub config_path: PathBuf,
    /// Direction override.
    pub mode: Option<String>,
    /// Keep replicating after catching up.
    pub continuous: bool,
}

/// Runs one session and waits for it to end.
pub fn run(options: SyncOptions) -> Result<SessionOutcome, CommandError> {
    let mut properties = GatewayProperties::load(&options.config_path)?;
    if options.continuous {
        properties.continuous = true;
    }
    let mode = options.mode.or_else(|| properties.replication_mode.clone());
    debug!("Syncing channels {:?}", options.request.channels());

    let config = ReplicatorConfig::build(&options.request, &properties, mode.as_deref())?;
    let store = Arc::new(LocalStore::new(
        properties.db_name.clone(),
        properties.db_dir.clone(),
    ));

    info!("Performing sync");
    let handle = start_session(config, Arc::clone(&store))?;
    let outcome = SessionSupervisor::new().run(handle, &store);

    match outcome.final_status.as_ref().and_then(|s| s.error.clone()) {
        Some(error) => Err(CommandError::Session(error)),
        None => Ok(outcome),
    }
}
