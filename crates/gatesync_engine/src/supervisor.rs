//! Blocks the calling thread until a session ends, then cleans up.

use crate::session::SessionHandle;
use gatesync_protocol::ReplicatorStatus;
use gatesync_store::LocalStore;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the supervisor saw when the session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// The last status the session reported.
    pub final_status: Option<ReplicatorStatus>,
}

impl SessionOutcome {
    /// Returns true if the session ended with an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.final_status
            .as_ref()
            .is_some_and(|status| status.error.is_some())
    }
}

/// Waits for sessions to end.
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    interval: Duration,
}

impl SessionSupervisor {
    /// Creates a supervisor with a one second wait slice.
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }

    /// Sets the wait slice.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the wait slice.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the session stops, then removes its listener and closes
    /// the store.
    ///
    /// Session errors are reported through the outcome, never as an `Err`.
    /// Cleanup failures are logged; both cleanup steps are always attempted.
    pub fn run(&self, handle: SessionHandle, store: &LocalStore) -> SessionOutcome {
        let state = handle.state();
        while !state.wait_stopped(self.interval) {
            debug!("Still replicating");
        }
        info!("Replication complete");

        let replicator = handle.replicator();
        if !replicator.remove_change_listener(handle.listener_token()) {
            warn!("Status listener was already removed");
        }
        replicator.join();

        if let Err(e) = store.close() {
            error!("Error closing local store {}: {}", store.name(), e);
        }

        SessionOutcome {
            final_status: state.last_status(),
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
