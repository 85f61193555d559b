//! The replication session engine.
//!
//! A [`Replicator`] owns one session: it opens the local store, runs pull
//! and push cycles against the gateway on a worker thread, and reports every
//! step to its listeners as a [`ReplicatorStatus`] snapshot. Exactly one
//! `Stopped` snapshot is emitted per session, always last.

use crate::config::ReplicatorConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransport;
use crate::listener::{ListenerToken, Listeners, ReplicatorChange};
use crate::transport::GatewayTransport;
use gatesync_protocol::{
    ActivityLevel, BulkDocsRequest, ChangeEntry, ChangesRequest, Document, DocumentFlags,
    Progress, ReplicatorStatus, Sequence,
};
use gatesync_store::LocalStore;
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, info_span, trace, warn};
use uuid::Uuid;

/// Lifecycle of a replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorState {
    /// Built, not started.
    Created,
    /// Opening the store and launching the worker.
    Starting,
    /// The worker is running.
    Running,
    /// Finished without error.
    Stopped,
    /// Finished with an error.
    Errored,
}

impl ReplicatorState {
    /// Returns true for `Stopped` and `Errored`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplicatorState::Stopped | ReplicatorState::Errored)
    }
}

impl fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State shared between the handle and the worker thread.
struct Shared {
    session: Uuid,
    config: ReplicatorConfig,
    store: Arc<LocalStore>,
    transport: Arc<dyn GatewayTransport>,
    listeners: Listeners,
    state: RwLock<ReplicatorState>,
    status: RwLock<ReplicatorStatus>,
    stop_requested: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

/// A replication session against one gateway database.
pub struct Replicator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Replicator {
    /// Creates a replicator that talks HTTP to the configured gateway.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the HTTP client cannot be
    /// built, e.g. because the pinned certificate is not a certificate.
    pub fn new(config: ReplicatorConfig, store: Arc<LocalStore>) -> SyncResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, store, Arc::new(transport)))
    }

    /// Creates a replicator over an arbitrary transport.
    pub fn with_transport(
        config: ReplicatorConfig,
        store: Arc<LocalStore>,
        transport: Arc<dyn GatewayTransport>,
    ) -> Self {
        let shared = Shared {
            session: Uuid::new_v4(),
            config,
            store,
            transport,
            listeners: Listeners::new(),
            state: RwLock::new(ReplicatorState::Created),
            status: RwLock::new(ReplicatorStatus::new(
                ActivityLevel::Stopped,
                Progress::default(),
            )),
            stop_requested: AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        };
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Returns the session ID used to correlate log events.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.shared.session
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &ReplicatorConfig {
        &self.shared.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReplicatorState {
        *self.shared.state.read()
    }

    /// Returns the most recently emitted status.
    #[must_use]
    pub fn status(&self) -> ReplicatorStatus {
        self.shared.status.read().clone()
    }

    /// Registers a listener for status changes.
    ///
    /// Listeners run on the worker thread and must not block.
    pub fn add_change_listener<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(&ReplicatorChange) + Send + Sync + 'static,
    {
        self.shared.listeners.add(Arc::new(listener))
    }

    /// Unregisters a listener. Returns false if the token was unknown.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.shared.listeners.remove(token)
    }

    /// Starts the session without blocking.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidStateTransition`] unless the replicator is `Created`
    /// - [`SyncError::LocalStore`] if the store cannot be opened
    pub fn start(&self) -> SyncResult<()> {
        {
            let mut state = self.shared.state.write();
            if *state != ReplicatorState::Created {
                return Err(SyncError::InvalidStateTransition {
                    from: state.to_string(),
                    to: ReplicatorState::Starting.to_string(),
                });
            }
            *state = ReplicatorState::Starting;
        }

        if let Err(e) = self.shared.store.open() {
            error!("Cannot open local store {}: {}", self.shared.store.name(), e);
            self.shared.set_state(ReplicatorState::Errored);
            return Err(e.into());
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("gatesync-replicator".into())
            .spawn(move || shared.run())
            .map_err(|e| {
                self.shared.set_state(ReplicatorState::Errored);
                SyncError::configuration(format!("cannot spawn replicator thread: {e}"))
            })?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Asks the session to stop.
    ///
    /// A running session finishes its current batch and then emits its final
    /// `Stopped` status. A session that was never started becomes `Stopped`
    /// without emitting anything.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.write();
            if *state == ReplicatorState::Created {
                *state = ReplicatorState::Stopped;
                return;
            }
        }
        self.shared.request_stop();
    }

    /// Waits for the worker thread to exit.
    pub fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Replicator worker panicked");
                self.shared.set_state(ReplicatorState::Errored);
            }
        }
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.shared.request_stop();
    }
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("session", &self.shared.session)
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn set_state(&self, state: ReplicatorState) {
        *self.state.write() = state;
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    fn emit(&self, status: ReplicatorStatus) {
        trace!("Status {}", status);
        *self.status.write() = status.clone();
        self.listeners.notify(&ReplicatorChange { status });
    }

    /// Worker thread body.
    fn run(&self) {
        let span = info_span!("replicator", session = %self.session);
        let _enter = span.enter();

        self.set_state(ReplicatorState::Running);
        info!(
            "Replicating {:?} with {} on channels {:?}",
            self.config.replicator_type(),
            self.config.target_url(),
            self.config.channels()
        );
        self.emit(ReplicatorStatus::new(
            ActivityLevel::Connecting,
            Progress::default(),
        ));

        let mut progress = Progress::default();
        let outcome = self.run_cycles(&mut progress);

        if let Err(e) = self.transport.close() {
            warn!("Error closing transport: {}", e);
        }

        match outcome {
            Ok(()) => {
                info!(
                    "Replication finished: {} of {} changes",
                    progress.completed, progress.total
                );
                self.set_state(ReplicatorState::Stopped);
                self.emit(ReplicatorStatus::stopped(progress));
            }
            Err(e) => {
                error!("Replication failed: {}", e);
                let session_error = e.to_session_error();
                if e.is_offline() {
                    self.emit(
                        ReplicatorStatus::new(ActivityLevel::Offline, progress)
                            .with_error(session_error.clone()),
                    );
                }
                self.set_state(ReplicatorState::Errored);
                self.emit(ReplicatorStatus::stopped(progress).with_error(session_error));
            }
        }
    }

    fn run_cycles(&self, progress: &mut Progress) -> SyncResult<()> {
        loop {
            let direction = self.config.replicator_type();
            if direction.pulls() {
                self.pull(progress)?;
            }
            if direction.pushes() && !self.stop_requested() {
                self.push(progress)?;
            }

            if !self.config.continuous() || self.stop_requested() {
                return Ok(());
            }
            self.emit(ReplicatorStatus::new(ActivityLevel::Idle, *progress));
            if self.idle() {
                return Ok(());
            }
        }
    }

    /// Sleeps for the poll interval. Returns true if a stop was requested.
    fn idle(&self) -> bool {
        let deadline = Instant::now() + self.config.poll_interval();
        let mut guard = self.wake_lock.lock();
        while !self.stop_requested() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.stop_requested()
    }

    fn pull(&self, progress: &mut Progress) -> SyncResult<()> {
        let channels = self.config.channels();
        if channels.is_empty() {
            debug!("No channels requested, nothing to pull");
            return Ok(());
        }

        let key = self.config.checkpoint_key();
        let mut since = self.store.checkpoint(&key)?.map(Sequence::new);
        if let Some(seq) = &since {
            debug!("Resuming pull after sequence {}", seq);
        }

        let batch_size = self.config.batch_size();
        while !self.stop_requested() {
            let request =
                ChangesRequest::new(channels.to_vec(), batch_size).with_since(since.clone());
            let page = self.transport.changes(&request)?;
            let count = page.results.len();

            if count > 0 {
                progress.total += count as u64;
                self.emit(ReplicatorStatus::busy(progress.completed, progress.total));
                for entry in &page.results {
                    self.apply_change(entry)?;
                    progress.completed += 1;
                }
            }

            if since.as_ref() != Some(&page.last_seq) {
                self.store.set_checkpoint(&key, page.last_seq.as_str())?;
            }
            if count > 0 {
                self.emit(ReplicatorStatus::busy(progress.completed, progress.total));
            }

            since = Some(page.last_seq);
            if count < batch_size as usize {
                break;
            }
        }
        Ok(())
    }

    fn apply_change(&self, entry: &ChangeEntry) -> SyncResult<()> {
        if entry.is_principal() || entry.winning_rev().is_none() {
            trace!("Skipping change {} at {} without a document revision", entry.id, entry.seq);
            return Ok(());
        }
        let (document, flags) = entry.to_document()?;

        if !(self.config.pull_filter())(&document, flags) {
            trace!("Pull filter rejected {} {}", document.id(), document.rev());
            return Ok(());
        }
        if flags.access_removed {
            if self.store.purge(document.id())? {
                debug!("Purged {} after channel access was removed", document.id());
            }
            return Ok(());
        }

        let id = document.id().to_string();
        let rev = document.rev().to_string();
        self.store.save_remote(&id, &rev, document.into_body())?;
        Ok(())
    }

    fn push(&self, progress: &mut Progress) -> SyncResult<()> {
        let filter = self.config.push_filter();
        let pending: Vec<_> = self
            .store
            .pending_push()?
            .into_iter()
            .filter(|stored| {
                let body = match &stored.body {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                let document = Document::new(stored.id.clone(), stored.rev.clone(), body);
                filter(&document, DocumentFlags::NONE)
            })
            .collect();

        if pending.is_empty() {
            debug!("Nothing to push");
            return Ok(());
        }

        progress.total += pending.len() as u64;
        self.emit(ReplicatorStatus::busy(progress.completed, progress.total));

        for chunk in pending.chunks(self.config.batch_size() as usize) {
            if self.stop_requested() {
                break;
            }

            let mut request = BulkDocsRequest::new();
            for stored in chunk {
                request.push(&stored.id, stored.remote_rev.as_deref(), &stored.body);
            }

            let results = self.transport.bulk_docs(&request)?;
            for result in &results {
                match result.accepted_rev() {
                    Some(rev) => self.store.mark_pushed(&result.id, rev)?,
                    None => warn!(
                        "Gateway rejected {}: {} {}",
                        result.id,
                        result.error.as_deref().unwrap_or("unknown"),
                        result.reason.as_deref().unwrap_or_default()
                    ),
                }
            }
            progress.completed += chunk.len() as u64;
            self.emit(ReplicatorStatus::busy(progress.completed, progress.total));
        }
        Ok(())
    }
}
