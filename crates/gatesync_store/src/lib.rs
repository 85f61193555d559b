//! # gatesync store
//!
//! The local document store that replication writes into.
//!
//! A store is identified by a name and a parent directory and lives in
//! `<parent>/<name>.gsdb/`. It is an append-only log of CBOR records that is
//! replayed into memory on open. Only one process may hold a store open at a
//! time.
//!
//! ## Example
//!
//! ```no_run
//! use gatesync_store::LocalStore;
//! use serde_json::json;
//!
//! let store = LocalStore::new("syncdb", "/tmp");
//! store.open().unwrap();
//! store.save_remote("order::1", "1-abc", json!({"total": 10})).unwrap();
//! store.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dir;
mod error;
mod record;
mod store;

pub use backend::{FileLog, LogBackend, MemoryLog};
pub use error::{StoreError, StoreResult};
pub use record::{compute_crc32, StoreRecord};
pub use store::{LocalStore, StoredDocument};
