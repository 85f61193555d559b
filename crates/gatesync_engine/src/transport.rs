//! Transport layer abstraction for the gateway REST API.

use crate::error::{SyncError, SyncResult};
use gatesync_protocol::{
    BulkDocsRequest, BulkDocsResult, ChangesRequest, ChangesResponse, Sequence,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A gateway transport handles network communication with the sync gateway.
///
/// The replicator calls it from its worker thread only, but implementations
/// must be shareable so tests can inspect them while a session runs.
pub trait GatewayTransport: Send + Sync {
    /// Reads one page of the changes feed.
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse>;

    /// Uploads a batch of documents.
    fn bulk_docs(&self, request: &BulkDocsRequest) -> SyncResult<Vec<BulkDocsResult>>;

    /// Closes the transport.
    fn close(&self) -> SyncResult<()>;
}

/// A scripted transport for testing.
///
/// Changes responses are served from a queue in order; once it is empty,
/// every further read returns an empty page that echoes the request's
/// resume sequence. Bulk uploads accept every document unless an error was queued.
#[derive(Debug, Default)]
pub struct MockTransport {
    closed: AtomicBool,
    changes: Mutex<VecDeque<SyncResult<ChangesResponse>>>,
    bulk_errors: Mutex<VecDeque<SyncError>>,
    changes_requests: Mutex<Vec<ChangesRequest>>,
    bulk_requests: Mutex<Vec<BulkDocsRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a changes page.
    pub fn push_changes(&self, response: ChangesResponse) {
        self.changes.lock().push_back(Ok(response));
    }

    /// Queues a changes failure.
    pub fn push_changes_error(&self, error: SyncError) {
        self.changes.lock().push_back(Err(error));
    }

    /// Queues a bulk upload failure.
    pub fn push_bulk_error(&self, error: SyncError) {
        self.bulk_errors.lock().push_back(error);
    }

    /// Returns every changes request seen so far.
    pub fn changes_requests(&self) -> Vec<ChangesRequest> {
        self.changes_requests.lock().clone()
    }

    /// Returns every bulk upload seen so far.
    pub fn bulk_requests(&self) -> Vec<BulkDocsRequest> {
        self.bulk_requests.lock().clone()
    }

    /// Returns true once [`GatewayTransport::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl GatewayTransport for MockTransport {
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        if self.is_closed() {
            return Err(SyncError::transport("mock transport closed"));
        }
        self.changes_requests.lock().push(request.clone());

        match self.changes.lock().pop_front() {
            Some(response) => response,
            None => Ok(ChangesResponse {
                results: Vec::new(),
                last_seq: request
                    .since
                    .clone()
                    .unwrap_or_else(|| Sequence::new("0")),
            }),
        }
    }

    fn bulk_docs(&self, request: &BulkDocsRequest) -> SyncResult<Vec<BulkDocsResult>> {
        if self.is_closed() {
            return Err(SyncError::transport("mock transport closed"));
        }
        self.bulk_requests.lock().push(request.clone());

        if let Some(error) = self.bulk_errors.lock().pop_front() {
            return Err(error);
        }

        let results = request
            .docs
            .iter()
            .map(|doc| {
                let id = doc
                    .get("_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let generation = doc
                    .get("_rev")
                    .and_then(|v| v.as_str())
                    .and_then(|rev| rev.split('-').next())
                    .and_then(|g| g.parse::<u64>().ok())
                    .unwrap_or(0);
                BulkDocsResult {
                    rev: Some(format!("{}-mock", generation + 1)),
                    id,
                    error: None,
                    reason: None,
                }
            })
            .collect();
        Ok(results)
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
