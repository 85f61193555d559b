//! Log record types and on-disk framing.
//!
//! Every record is framed as:
//!
//! ```text
//! | magic "GSRC" (4) | payload len u32 LE (4) | CBOR payload | crc32 LE (4) |
//! ```
//!
//! The CRC covers the payload only. A frame whose declared length runs past
//! the end of the log is a torn write and is reported as such so the store can
//! truncate it; a complete frame with a bad magic or checksum is corruption.

use crate::backend::LogBackend;
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Magic bytes at the start of every frame.
pub const RECORD_MAGIC: [u8; 4] = *b"GSRC";

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 4;

/// A single change to the store, as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreRecord {
    /// A document revision was saved.
    Put {
        /// Document ID.
        id: String,
        /// Revision ID.
        rev: String,
        /// Document body (JSON object).
        body: serde_json::Value,
        /// True when the revision was written locally and still awaits push.
        local: bool,
    },
    /// A local revision was accepted by the gateway.
    Pushed {
        /// Document ID.
        id: String,
        /// Revision the gateway accepted.
        rev: String,
    },
    /// A document was removed from the store.
    Purge {
        /// Document ID.
        id: String,
    },
    /// A replication checkpoint was advanced.
    Checkpoint {
        /// Checkpoint key (one per endpoint + channel set).
        key: String,
        /// Last gateway sequence processed.
        sequence: String,
    },
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum Frame {
    /// A valid record and the offset of the next frame.
    Record(StoreRecord, u64),
    /// The log ends with a partially written frame starting at this offset.
    TornTail(u64),
    /// Clean end of log.
    End,
}

/// Encodes a record into a complete frame.
pub fn encode_frame(record: &StoreRecord) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(record, &mut payload).map_err(|e| StoreError::Codec(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Codec(format!("record too large: {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    frame.extend_from_slice(&RECORD_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
    Ok(frame)
}

/// Reads the frame starting at `offset`.
pub fn read_frame(log: &dyn LogBackend, offset: u64) -> StoreResult<Frame> {
    let size = log.size();
    if offset == size {
        return Ok(Frame::End);
    }
    if offset + HEADER_LEN as u64 > size {
        return Ok(Frame::TornTail(offset));
    }

    let header = log.read_at(offset, HEADER_LEN)?;
    if header[0..4] != RECORD_MAGIC {
        return Err(StoreError::corrupted(offset, "bad record magic"));
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let frame_end = offset + (HEADER_LEN + len + TRAILER_LEN) as u64;
    if frame_end > size {
        return Ok(Frame::TornTail(offset));
    }

    let payload = log.read_at(offset + HEADER_LEN as u64, len)?;
    let trailer = log.read_at(offset + (HEADER_LEN + len) as u64, TRAILER_LEN)?;
    let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if stored_crc != compute_crc32(&payload) {
        return Err(StoreError::corrupted(offset, "checksum mismatch"));
    }

    let record: StoreRecord = ciborium::from_reader(payload.as_slice())
        .map_err(|e| StoreError::corrupted(offset, format!("undecodable record: {e}")))?;
    Ok(Frame::Record(record, frame_end))
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
