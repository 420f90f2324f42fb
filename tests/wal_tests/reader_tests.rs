//! Tests for the commit log reader
//!
//! These tests verify:
//! - Reading frames in order
//! - Torn tail detection (header, payload, checksum)
//! - Mid-file damage reporting
//! - Frame header checksums (length and txid damage)

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use todokv::config::SyncStrategy;
use todokv::wal::{Commit, Frame, Operation, WalReader, WalWriter, FILE_HEADER_SIZE, HEADER_SIZE};
use todokv::TodoKvError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.db");
    (temp_dir, path)
}

fn commit(txid: u64) -> Commit {
    Commit::new(
        txid,
        vec![Operation::Put {
            bucket: "b".to_string(),
            key: txid.to_be_bytes().to_vec(),
            value: b"value".to_vec(),
        }],
    )
}

/// Write `count` commits and return the file length after each one
fn write_commits(path: &PathBuf, count: u64) -> Vec<u64> {
    let mut writer = WalWriter::open(path, SyncStrategy::EveryCommit).unwrap();
    (1..=count).map(|txid| writer.append(&commit(txid)).unwrap()).collect()
}

fn append_raw(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_read_header_only_file() {
    let (_temp, path) = setup_temp_log();
    write_commits(&path, 0);

    let mut reader = WalReader::open(&path).unwrap();

    assert!(matches!(reader.next_frame().unwrap(), Frame::End));
    assert_eq!(reader.position(), FILE_HEADER_SIZE);
}

#[test]
fn test_read_frames_in_order() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 3);

    let mut reader = WalReader::open(&path).unwrap();
    for expected in 1..=3 {
        match reader.next_frame().unwrap() {
            Frame::Commit(c) => assert_eq!(c.txid, expected),
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(reader.position(), lengths[expected as usize - 1]);
    }

    assert!(matches!(reader.next_frame().unwrap(), Frame::End));
    assert!(matches!(reader.next_frame().unwrap(), Frame::End));
}

#[test]
fn test_open_missing_file_fails() {
    let (_temp, path) = setup_temp_log();

    assert!(matches!(WalReader::open(&path), Err(TodoKvError::Io(_))));
}

#[test]
fn test_open_short_file_fails() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, b"TK").unwrap();

    assert!(matches!(WalReader::open(&path), Err(TodoKvError::Corruption(_))));
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_partial_frame_header_is_torn() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 2);
    append_raw(&path, &[1, 2, 3]);

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();
    reader.next_frame().unwrap();

    match reader.next_frame().unwrap() {
        Frame::Torn { offset } => assert_eq!(offset, lengths[1]),
        other => panic!("expected torn frame, got {:?}", other),
    }
    assert!(matches!(reader.next_frame().unwrap(), Frame::End));
}

#[test]
fn test_partial_payload_is_torn() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 1);
    let frame = commit(2).encode().unwrap();
    append_raw(&path, &frame[..frame.len() - 3]);

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    match reader.next_frame().unwrap() {
        Frame::Torn { offset } => assert_eq!(offset, lengths[0]),
        other => panic!("expected torn frame, got {:?}", other),
    }
}

#[test]
fn test_bad_checksum_on_last_frame_is_torn() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 2);

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    match reader.next_frame().unwrap() {
        Frame::Torn { offset } => assert_eq!(offset, lengths[0]),
        other => panic!("expected torn frame, got {:?}", other),
    }
}

// =============================================================================
// Mid-file Damage Tests
// =============================================================================

#[test]
fn test_bad_checksum_before_later_frames_is_corruption() {
    let (_temp, path) = setup_temp_log();
    write_commits(&path, 3);

    let mut bytes = fs::read(&path).unwrap();
    // Flip a payload byte of the first frame
    let target = FILE_HEADER_SIZE as usize + HEADER_SIZE + 2;
    bytes[target] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let mut reader = WalReader::open(&path).unwrap();

    assert!(matches!(reader.next_frame(), Err(TodoKvError::Corruption(_))));
}

// =============================================================================
// Frame Header Damage Tests
// =============================================================================

/// Overwrite `bytes` at `offset` inside the file
fn patch_file(path: &PathBuf, offset: usize, bytes: &[u8]) {
    let mut contents = fs::read(path).unwrap();
    contents[offset..offset + bytes.len()].copy_from_slice(bytes);
    fs::write(path, &contents).unwrap();
}

/// A frame header whose own checksum is valid
fn raw_header(txid: u64, crc: u32, len: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(&txid.to_le_bytes());
    header.extend_from_slice(&crc.to_le_bytes());
    header.extend_from_slice(&len.to_le_bytes());
    let header_crc = crc32fast::hash(&header);
    header.extend_from_slice(&header_crc.to_le_bytes());
    header
}

#[test]
fn test_damaged_length_before_later_frames_is_corruption() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 5);

    // Frame 2 starts where frame 1 ends; its len field sits at +12
    patch_file(&path, lengths[0] as usize + 12, &0x00ff_ffffu32.to_le_bytes());

    let mut reader = WalReader::open(&path).unwrap();
    assert!(matches!(reader.next_frame().unwrap(), Frame::Commit(_)));

    assert!(matches!(reader.next_frame(), Err(TodoKvError::Corruption(_))));
}

#[test]
fn test_damaged_txid_before_later_frames_is_corruption() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 3);

    patch_file(&path, lengths[0] as usize, &99u64.to_le_bytes());

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    assert!(matches!(reader.next_frame(), Err(TodoKvError::Corruption(_))));
}

#[test]
fn test_damaged_header_on_last_frame_is_corruption() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 2);

    // A complete header is never left behind by an interrupted append
    patch_file(&path, lengths[0] as usize + 12, &[0xAA]);

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    assert!(matches!(reader.next_frame(), Err(TodoKvError::Corruption(_))));
}

#[test]
fn test_oversized_length_is_corruption_even_at_tail() {
    let (_temp, path) = setup_temp_log();
    write_commits(&path, 1);
    append_raw(&path, &raw_header(2, 0, u32::MAX));

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    assert!(matches!(reader.next_frame(), Err(TodoKvError::Corruption(_))));
}

#[test]
fn test_valid_header_with_missing_payload_is_torn() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 1);
    append_raw(&path, &raw_header(2, 0, 64));

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();

    match reader.next_frame().unwrap() {
        Frame::Torn { offset } => assert_eq!(offset, lengths[0]),
        other => panic!("expected torn frame, got {:?}", other),
    }
}

#[test]
fn test_zero_filled_tail_is_torn() {
    let (_temp, path) = setup_temp_log();
    let lengths = write_commits(&path, 2);
    append_raw(&path, &[0u8; 4096]);

    let mut reader = WalReader::open(&path).unwrap();
    reader.next_frame().unwrap();
    reader.next_frame().unwrap();

    match reader.next_frame().unwrap() {
        Frame::Torn { offset } => assert_eq!(offset, lengths[1]),
        other => panic!("expected torn frame, got {:?}", other),
    }
}
