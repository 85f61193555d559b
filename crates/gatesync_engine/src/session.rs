//! Session start and the state shared with the supervisor.

use crate::config::ReplicatorConfig;
use crate::error::SyncResult;
use crate::listener::ListenerToken;
use crate::replicator::Replicator;
use crate::transport::GatewayTransport;
use gatesync_protocol::{ActivityLevel, ReplicatorStatus};
use gatesync_store::LocalStore;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Whether a session is still replicating, plus its last reported status.
///
/// Written by the status listener on the replicator's worker thread and read
/// by the supervisor. The flag only ever goes from `true` to `false`.
#[derive(Debug)]
pub struct SessionState {
    replicating: Mutex<bool>,
    stopped: Condvar,
    last_status: Mutex<Option<ReplicatorStatus>>,
}

impl SessionState {
    /// Creates the state of a session that is replicating.
    pub fn new() -> Self {
        Self {
            replicating: Mutex::new(true),
            stopped: Condvar::new(),
            last_status: Mutex::new(None),
        }
    }

    /// Returns true until the session reported `Stopped`.
    #[must_use]
    pub fn is_replicating(&self) -> bool {
        *self.replicating.lock()
    }

    /// Clears the flag and wakes waiters. Returns true if this call cleared it.
    pub fn mark_stopped(&self) -> bool {
        let mut replicating = self.replicating.lock();
        if !*replicating {
            return false;
        }
        *replicating = false;
        self.stopped.notify_all();
        true
    }

    /// Records one status event. Returns true if it ended the session.
    ///
    /// Errors are logged but do not end the session by themselves; only a
    /// `Stopped` activity does.
    pub fn observe(&self, status: &ReplicatorStatus) -> bool {
        if let Some(err) = &status.error {
            error!(
                "Error replicating from sync gateway: {} (code {})",
                err.message, err.code
            );
        }
        info!("Replication status: {}", status);
        *self.last_status.lock() = Some(status.clone());

        match status.activity {
            ActivityLevel::Stopped => {
                info!(
                    "sync stopped: {} of {}",
                    status.progress.completed, status.progress.total
                );
                self.mark_stopped()
            }
            ActivityLevel::Busy => {
                info!(
                    "sync progress: {} of {}",
                    status.progress.completed, status.progress.total
                );
                false
            }
            _ => false,
        }
    }

    /// Returns the last observed status.
    #[must_use]
    pub fn last_status(&self) -> Option<ReplicatorStatus> {
        self.last_status.lock().clone()
    }

    /// Waits up to `interval` for the session to stop.
    ///
    /// Returns true once the session has stopped. A wakeup that finds the
    /// session still replicating is logged; the caller waits again.
    pub fn wait_stopped(&self, interval: Duration) -> bool {
        let mut replicating = self.replicating.lock();
        if !*replicating {
            return true;
        }
        let result = self.stopped.wait_for(&mut replicating, interval);
        if !*replicating {
            return true;
        }
        if !result.timed_out() {
            debug!("Woke while still replicating, waiting again");
        }
        false
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// A started session: the replicator, its status listener and shared state.
#[derive(Debug)]
pub struct SessionHandle {
    replicator: Replicator,
    token: ListenerToken,
    state: Arc<SessionState>,
}

impl SessionHandle {
    /// Returns the replicator.
    #[must_use]
    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    /// Returns the token of the session's status listener.
    #[must_use]
    pub fn listener_token(&self) -> ListenerToken {
        self.token
    }

    /// Returns the shared session state.
    #[must_use]
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }
}

/// Starts a session against the configured gateway over HTTP.
///
/// Opens (or reuses) the store, registers the status listener and starts the
/// replicator. Does not block.
///
/// # Errors
///
/// Fails if the HTTP client cannot be built, the store cannot be opened or
/// the replicator cannot start.
pub fn start_session(config: ReplicatorConfig, store: Arc<LocalStore>) -> SyncResult<SessionHandle> {
    let replicator = Replicator::new(config, store)?;
    launch(replicator)
}

/// Starts a session over the given transport.
///
/// # Errors
///
/// Fails if the store cannot be opened or the replicator cannot start.
pub fn start_session_with_transport(
    config: ReplicatorConfig,
    store: Arc<LocalStore>,
    transport: Arc<dyn GatewayTransport>,
) -> SyncResult<SessionHandle> {
    launch(Replicator::with_transport(config, store, transport))
}

fn launch(replicator: Replicator) -> SyncResult<SessionHandle> {
    let state = Arc::new(SessionState::new());

    let observer = Arc::clone(&state);
    let token = replicator.add_change_listener(move |change| {
        observer.observe(&change.status);
    });

    if let Err(e) = replicator.start() {
        replicator.remove_change_listener(token);
        return Err(e);
    }
    debug!("Started session {}", replicator.session_id());

    Ok(SessionHandle {
        replicator,
        token,
        state,
    })
}
