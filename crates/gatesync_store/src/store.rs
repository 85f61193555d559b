//! The local document store.

use crate::backend::{FileLog, LogBackend};
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::record::{encode_frame, read_frame, Frame, StoreRecord};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A document as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document ID.
    pub id: String,
    /// Current revision ID.
    pub rev: String,
    /// Document body.
    pub body: serde_json::Value,
    /// True when this revision was saved locally and not yet pushed.
    pub pending_push: bool,
    /// Latest revision the gateway is known to have, if any.
    pub remote_rev: Option<String>,
}

/// Documents and checkpoints rebuilt from the log.
#[derive(Default)]
struct Contents {
    documents: BTreeMap<String, StoredDocument>,
    checkpoints: HashMap<String, String>,
}

impl Contents {
    fn apply(&mut self, record: StoreRecord) {
        match record {
            StoreRecord::Put {
                id,
                rev,
                body,
                local,
            } => {
                let remote_rev = if local {
                    self.documents
                        .get(&id)
                        .and_then(|doc| doc.remote_rev.clone())
                } else {
                    Some(rev.clone())
                };
                self.documents.insert(
                    id.clone(),
                    StoredDocument {
                        id,
                        rev,
                        body,
                        pending_push: local,
                        remote_rev,
                    },
                );
            }
            StoreRecord::Pushed { id, rev } => {
                if let Some(doc) = self.documents.get_mut(&id) {
                    doc.remote_rev = Some(rev.clone());
                    doc.rev = rev;
                    doc.pending_push = false;
                }
            }
            StoreRecord::Purge { id } => {
                self.documents.remove(&id);
            }
            StoreRecord::Checkpoint { key, sequence } => {
                self.checkpoints.insert(key, sequence);
            }
        }
    }
}

struct OpenStore {
    dir: StoreDir,
    log: FileLog,
    contents: Contents,
}

impl OpenStore {
    fn load(parent: &Path, name: &str) -> StoreResult<Self> {
        let dir = StoreDir::open(parent, name)?;
        let mut log = FileLog::open(&dir.log_path())?;
        let mut contents = Contents::default();

        let mut offset = 0u64;
        let mut replayed = 0usize;
        loop {
            match read_frame(&log, offset)? {
                Frame::Record(record, next) => {
                    contents.apply(record);
                    offset = next;
                    replayed += 1;
                }
                Frame::TornTail(at) => {
                    warn!("Dropping torn record at offset {} in {:?}", at, log.path());
                    log.truncate(at)?;
                    break;
                }
                Frame::End => break,
            }
        }

        debug!(
            "Replayed {} records ({} documents) from {:?}",
            replayed,
            contents.documents.len(),
            log.path()
        );
        Ok(Self { dir, log, contents })
    }

    fn write(&mut self, record: StoreRecord) -> StoreResult<()> {
        let frame = encode_frame(&record)?;
        self.log.append(&frame)?;
        self.contents.apply(record);
        Ok(())
    }
}

/// A handle to a named local store inside a parent directory.
///
/// The handle starts closed. [`LocalStore::open`] creates the store on first
/// use and is a no-op when already open; [`LocalStore::close`] is a no-op when
/// already closed and never reopens. The handle is `Sync`, so it can be shared
/// between the replicator worker and the thread that eventually closes it.
pub struct LocalStore {
    name: String,
    parent: PathBuf,
    inner: Mutex<Option<OpenStore>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("open", &self.is_open())
            .finish()
    }
}

impl LocalStore {
    /// Creates a closed handle for store `name` under `parent`.
    pub fn new(name: impl Into<String>, parent: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            inner: Mutex::new(None),
        }
    }

    /// Creates a handle and opens it immediately.
    ///
    /// # Errors
    ///
    /// Same as [`LocalStore::open`].
    pub fn open_new(name: impl Into<String>, parent: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(name, parent);
        store.open()?;
        Ok(store)
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory the store lives in.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        StoreDir::path_for(&self.parent, &self.name)
    }

    /// Opens the store, creating it if absent. Reuses an already open handle.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Locked`] if another process holds the store
    /// - [`StoreError::InvalidPath`] if the name is not a plain file name
    /// - [`StoreError::Corrupted`] if the log cannot be replayed
    pub fn open(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            debug!("Reusing open store {}", self.name);
            return Ok(());
        }
        let store = OpenStore::load(&self.parent, &self.name)?;
        debug!("Opened store {} at {:?}", self.name, store.dir.path());
        *inner = Some(store);
        Ok(())
    }

    /// Returns true while the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Syncs and closes the store. Closing a closed store does nothing.
    ///
    /// The handle is closed afterwards even if the final sync fails.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the final sync fails.
    pub fn close(&self) -> StoreResult<()> {
        let Some(mut store) = self.inner.lock().take() else {
            return Ok(());
        };
        let result = store.log.sync();
        debug!("Closed store {}", self.name);
        result
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut OpenStore) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = self.inner.lock();
        let store = inner.as_mut().ok_or(StoreError::Closed)?;
        f(store)
    }

    /// Saves a revision received from the gateway.
    ///
    /// A remote revision replaces any local revision of the same document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open, or an I/O
    /// error if the record cannot be appended.
    pub fn save_remote(&self, id: &str, rev: &str, body: serde_json::Value) -> StoreResult<()> {
        self.with_open(|store| {
            if store
                .contents
                .documents
                .get(id)
                .is_some_and(|doc| doc.pending_push && doc.rev != rev)
            {
                warn!("Remote revision {} of {} replaces unpushed local revision", rev, id);
            }
            store.write(StoreRecord::Put {
                id: id.to_string(),
                rev: rev.to_string(),
                body,
                local: false,
            })
        })
    }

    /// Saves a local edit and returns the new revision ID.
    ///
    /// The document is marked pending until [`LocalStore::mark_pushed`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open, or an I/O
    /// error if the record cannot be appended.
    pub fn save_local(&self, id: &str, body: serde_json::Value) -> StoreResult<String> {
        self.with_open(|store| {
            let parent_rev = store.contents.documents.get(id).map(|doc| doc.rev.clone());
            let rev = next_revision(parent_rev.as_deref(), &body);
            store.write(StoreRecord::Put {
                id: id.to_string(),
                rev: rev.clone(),
                body,
                local: true,
            })?;
            Ok(rev)
        })
    }

    /// Records that the gateway accepted a pushed revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open, or an I/O
    /// error if the record cannot be appended.
    pub fn mark_pushed(&self, id: &str, rev: &str) -> StoreResult<()> {
        self.with_open(|store| {
            store.write(StoreRecord::Pushed {
                id: id.to_string(),
                rev: rev.to_string(),
            })
        })
    }

    /// Removes a document. Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open, or an I/O
    /// error if the record cannot be appended.
    pub fn purge(&self, id: &str) -> StoreResult<bool> {
        self.with_open(|store| {
            if !store.contents.documents.contains_key(id) {
                return Ok(false);
            }
            store.write(StoreRecord::Purge { id: id.to_string() })?;
            Ok(true)
        })
    }

    /// Returns a document by ID.
    pub fn get(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.with_open(|store| Ok(store.contents.documents.get(id).cloned()))
    }

    /// Returns the number of documents in the store.
    pub fn document_count(&self) -> StoreResult<usize> {
        self.with_open(|store| Ok(store.contents.documents.len()))
    }

    /// Returns local revisions not yet pushed, ordered by document ID.
    pub fn pending_push(&self) -> StoreResult<Vec<StoredDocument>> {
        self.with_open(|store| {
            Ok(store
                .contents
                .documents
                .values()
                .filter(|doc| doc.pending_push)
                .cloned()
                .collect())
        })
    }

    /// Returns the stored sequence for a checkpoint key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open.
    pub fn checkpoint(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_open(|store| Ok(store.contents.checkpoints.get(key).cloned()))
    }

    /// Advances a checkpoint and makes everything written so far durable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the store is not open, or an I/O
    /// error if the record cannot be written or synced.
    pub fn set_checkpoint(&self, key: &str, sequence: &str) -> StoreResult<()> {
        self.with_open(|store| {
            store.write(StoreRecord::Checkpoint {
                key: key.to_string(),
                sequence: sequence.to_string(),
            })?;
            store.log.sync()
        })
    }
}

/// Builds `<generation>-<digest>` from the parent revision and new body.
fn next_revision(parent_rev: Option<&str>, body: &serde_json::Value) -> String {
    let generation = parent_rev
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(generation, _)| generation.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    let mut hasher = Sha256::new();
    hasher.update(parent_rev.unwrap_or_default().as_bytes());
    hasher.update(body.to_string().as_bytes());
    let digest: String = hasher.finalize()[..16]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    format!("{generation}-{digest}")
}
