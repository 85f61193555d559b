//! Status change listeners.
//!
//! A replicator distributes every status snapshot to its registered
//! listeners, in emission order, on the replicator's worker thread.

use gatesync_protocol::ReplicatorStatus;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A status change delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatorChange {
    /// The new status snapshot.
    pub status: ReplicatorStatus,
}

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Callback = Arc<dyn Fn(&ReplicatorChange) + Send + Sync>;

/// Registry of change listeners.
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerToken, Callback)>>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, callback: Callback) -> ListenerToken {
        let token = ListenerToken(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((token, callback));
        token
    }

    /// Returns false if the token was not registered.
    pub(crate) fn remove(&self, token: ListenerToken) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(t, _)| *t != token);
        entries.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Calls every listener with `change`.
    ///
    /// Callbacks run outside the registry lock, so a listener may remove
    /// itself while being notified.
    pub(crate) fn notify(&self, change: &ReplicatorChange) {
        let callbacks: Vec<Callback> = self
            .entries
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }
}
