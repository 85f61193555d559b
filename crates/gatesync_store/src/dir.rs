//! Store directory layout and locking.
//!
//! ```text
//! <parent>/<name>.gsdb/
//! ├─ LOCK       # advisory lock, single process per store
//! └─ docs.log   # append-only record log
//! ```

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const STORE_EXTENSION: &str = "gsdb";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "docs.log";

/// An opened store directory holding the exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Returns the directory path used for store `name` under `parent`.
    #[must_use]
    pub fn path_for(parent: &Path, name: &str) -> PathBuf {
        parent.join(format!("{name}.{STORE_EXTENSION}"))
    }

    /// Opens the store directory, creating it if missing, and takes the lock.
    pub fn open(parent: &Path, name: &str) -> StoreResult<Self> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(StoreError::InvalidPath {
                path: parent.join(name),
                reason: "store name must be a non-empty file name".into(),
            });
        }

        let path = Self::path_for(parent, name);
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        if !path.is_dir() {
            return Err(StoreError::InvalidPath {
                path,
                reason: "not a directory".into(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path));
        }

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path(), "syncdb").unwrap();

        assert_eq!(dir.path(), temp.path().join("syncdb.gsdb"));
        assert!(dir.path().is_dir());
        assert_eq!(dir.log_path(), temp.path().join("syncdb.gsdb/docs.log"));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _first = StoreDir::open(temp.path(), "syncdb").unwrap();

        let second = StoreDir::open(temp.path(), "syncdb");
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(StoreDir::open(temp.path(), "syncdb").unwrap());

        assert!(StoreDir::open(temp.path(), "syncdb").is_ok());
    }

    #[test]
    fn rejects_path_like_names() {
        let temp = tempdir().unwrap();
        assert!(StoreDir::open(temp.path(), "").is_err());
        assert!(StoreDir::open(temp.path(), "a/b").is_err());
    }
}
