//! Commit log entry definitions
//!
//! Defines the structure of a single commit frame: the on-disk record of
//! one write transaction.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TodoKvError};

/// Magic bytes identifying a todokv storage file
pub const MAGIC: &[u8; 4] = b"TKVL";

/// Current storage file format version
pub const FORMAT_VERSION: u16 = 2;

/// File header size: Magic (4) + Version (2) = 6 bytes
pub const FILE_HEADER_SIZE: u64 = 6;

/// Frame header size: TxId (8) + CRC (4) + Len (4) + Header CRC (4) = 20 bytes
pub const HEADER_SIZE: usize = 20;

/// Bytes of the frame header covered by the header CRC
const HEADER_BODY_SIZE: usize = 16;

/// Maximum payload size of a single frame (256 MB)
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// A committed write transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Transaction id - strictly increasing across the file
    pub txid: u64,

    /// Timestamp (unix millis) when the commit was created
    pub timestamp: u64,

    /// Mutations applied by this transaction, in order
    pub operations: Vec<Operation>,
}

/// Mutations that can be committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create an empty bucket
    CreateBucket { bucket: String },

    /// Put a key-value pair
    Put {
        bucket: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },

    /// Delete a key
    Delete { bucket: String, key: Vec<u8> },

    /// Persist a bucket's sequence counter
    SetSequence { bucket: String, value: u64 },
}

impl Commit {
    /// Create a commit stamped with the current time
    pub fn new(txid: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            txid,
            timestamp,
            operations,
        }
    }

    /// Encode as a complete frame
    ///
    /// ```text
    /// ┌──────────┬───────────┬──────────┬──────────────┬─────────────┐
    /// │ TxId (8) │ CRC32 (4) │ Len (4)  │ Hdr CRC32 (4)│ Payload     │
    /// └──────────┴───────────┴──────────┴──────────────┴─────────────┘
    /// ```
    ///
    /// `CRC32` covers the payload, `Hdr CRC32` covers the 16 bytes before it.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        if payload.len() > MAX_FRAME_SIZE as usize {
            return Err(TodoKvError::Serialization(format!(
                "Commit too large: {} bytes (max {})",
                payload.len(),
                MAX_FRAME_SIZE
            )));
        }

        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.txid.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        let header_crc = crc32fast::hash(&frame[..HEADER_BODY_SIZE]);
        frame.extend_from_slice(&header_crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        Ok(frame)
    }

    /// Decode a frame payload whose CRC has already been checked
    ///
    /// `header_txid` is the id recorded in the frame header; it must agree
    /// with the id inside the payload.
    pub fn decode_payload(header_txid: u64, payload: &[u8]) -> Result<Self> {
        let commit: Commit = bincode::deserialize(payload).map_err(|e| {
            TodoKvError::Corruption(format!("undecodable commit payload: {}", e))
        })?;

        if commit.txid != header_txid {
            return Err(TodoKvError::Corruption(format!(
                "frame header txid {} does not match payload txid {}",
                header_txid, commit.txid
            )));
        }

        Ok(commit)
    }

    /// True if the commit carries no mutations
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub txid: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    /// Parse the fixed 20-byte frame header
    ///
    /// Returns `None` when the header checksum does not match, in which
    /// case none of the fields can be trusted.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Option<Self> {
        let mut txid = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        let mut header_crc = [0u8; 4];
        txid.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);
        header_crc.copy_from_slice(&bytes[16..20]);

        if crc32fast::hash(&bytes[..HEADER_BODY_SIZE]) != u32::from_le_bytes(header_crc) {
            return None;
        }

        Some(Self {
            txid: u64::from_le_bytes(txid),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        })
    }
}

/// The 6-byte file header written once at creation
pub fn file_header() -> [u8; FILE_HEADER_SIZE as usize] {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

/// Validate a file header read from disk
pub fn check_file_header(header: &[u8]) -> Result<()> {
    if header.len() < FILE_HEADER_SIZE as usize || &header[0..4] != MAGIC {
        return Err(TodoKvError::Corruption(format!(
            "invalid storage file magic: expected TKVL, got {:?}",
            &header[..header.len().min(4)]
        )));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(TodoKvError::Corruption(format!(
            "unsupported storage file version: {}",
            version
        )));
    }

    Ok(())
}
