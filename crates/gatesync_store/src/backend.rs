//! Append-only byte logs backing the document store.
//!
//! A backend is an opaque byte sink: it knows nothing about record framing.
//! [`crate::record`] owns the on-disk format.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte log that supports positional reads and appends.
///
/// # Invariants
///
/// - `append` returns the offset at which the data starts
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `sync` makes every appended byte durable
pub trait LogBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Returns the current log length in bytes.
    fn size(&self) -> u64;

    /// Discards everything after `new_size`.
    ///
    /// Used to drop a torn tail record left behind by a crash.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;

    /// Flushes data and metadata to durable storage.
    fn sync(&mut self) -> StoreResult<()>;
}

fn check_bounds(offset: u64, len: usize, size: u64) -> StoreResult<()> {
    let end = offset.saturating_add(len as u64);
    if offset > size || end > size {
        return Err(StoreError::ReadPastEnd { offset, len, size });
    }
    Ok(())
}

/// A log stored in a single file.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileLog {
    /// Opens the log file at `path`, creating it if it does not exist.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLog {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        check_bounds(offset, len, self.size)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        if new_size > self.size {
            return Err(StoreError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: self.size,
            });
        }
        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }

    fn sync(&mut self) -> StoreResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// A log held in memory. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryLog {
    data: Vec<u8>,
}

impl MemoryLog {
    /// Creates an empty in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-filled with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl LogBackend for MemoryLog {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        check_bounds(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let offset = self.size();
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        if new_size > self.size() {
            return Err(StoreError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: self.size(),
            });
        }
        self.data.truncate(new_size as usize);
        Ok(())
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
