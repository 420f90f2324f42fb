//! Commit log reader
//!
//! Reads commit frames from the storage file in order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, TodoKvError};

use super::entry::{check_file_header, Commit, FrameHeader, FILE_HEADER_SIZE, HEADER_SIZE, MAX_FRAME_SIZE};

/// What the reader found at the current position
#[derive(Debug)]
pub enum Frame {
    /// A complete, checksummed commit
    Commit(Commit),

    /// Clean end of file
    End,

    /// An incomplete last frame starting at `offset`
    ///
    /// Its header is either cut short or checks out; only the payload is
    /// missing or fails its checksum.
    Torn { offset: u64 },
}

/// Reads frames from the storage file
pub struct WalReader {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
    done: bool,
}

impl WalReader {
    /// Open a storage file for reading and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < FILE_HEADER_SIZE {
            return Err(TodoKvError::Corruption(format!(
                "storage file shorter than its header ({} bytes)",
                file_len
            )));
        }

        let mut reader = BufReader::new(file);
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;
        check_file_header(&header)?;

        Ok(Self {
            reader,
            position: FILE_HEADER_SIZE,
            file_len,
            done: false,
        })
    }

    /// Read the next frame
    ///
    /// Once `End` or `Torn` is returned, every later call returns `End`.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if self.done || self.position == self.file_len {
            self.done = true;
            return Ok(Frame::End);
        }

        let offset = self.position;
        let remaining = self.file_len - offset;

        // Step 1: Frame header must be complete
        if remaining < HEADER_SIZE as u64 {
            self.done = true;
            return Ok(Frame::Torn { offset });
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_bytes)?;

        // Step 2: Header checksum. Appends never leave a complete but bad
        // header, so this is damage unless only zeros follow.
        let header = match FrameHeader::parse(&header_bytes) {
            Some(header) => header,
            None => {
                if header_bytes.iter().all(|&b| b == 0) && self.rest_is_zero()? {
                    self.done = true;
                    return Ok(Frame::Torn { offset });
                }
                return Err(TodoKvError::Corruption(format!(
                    "frame header checksum mismatch at offset {}",
                    offset
                )));
            }
        };

        // Step 3: Length must be sane before it is compared against EOF
        if header.len > MAX_FRAME_SIZE {
            return Err(TodoKvError::Corruption(format!(
                "frame at offset {} claims {} bytes (max {})",
                offset, header.len, MAX_FRAME_SIZE
            )));
        }

        // Step 4: Payload must fit in the file
        let frame_end = offset + HEADER_SIZE as u64 + header.len as u64;
        if frame_end > self.file_len {
            self.done = true;
            return Ok(Frame::Torn { offset });
        }

        let mut payload = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut payload)?;

        // Step 5: Payload checksum. A bad last frame is a torn write; a bad frame
        // with data after it means the file itself is damaged.
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != header.crc {
            if frame_end == self.file_len {
                self.done = true;
                return Ok(Frame::Torn { offset });
            }
            return Err(TodoKvError::Corruption(format!(
                "CRC mismatch at offset {}: expected {:08x}, got {:08x}",
                offset, header.crc, actual_crc
            )));
        }

        // Step 6: Decode
        let commit = Commit::decode_payload(header.txid, &payload)?;
        self.position = frame_end;

        Ok(Frame::Commit(commit))
    }

    /// Consume the rest of the file, reporting whether it is all zeros
    fn rest_is_zero(&mut self) -> Result<bool> {
        let mut rest = Vec::new();
        self.reader.read_to_end(&mut rest)?;
        Ok(rest.iter().all(|&b| b == 0))
    }

    /// Offset just past the last frame returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total file length at open time
    pub fn file_len(&self) -> u64 {
        self.file_len
    }
}
