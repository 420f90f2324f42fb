//! Tests for Database
//!
//! These tests verify:
//! - Open/close lifecycle and file locking
//! - Persistence across reopen
//! - Crash recovery with a torn tail
//! - Damaged frame headers are fatal and never truncated
//! - Compaction (manual and at open)
//! - Concurrent writers

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use todokv::config::{Config, SyncStrategy};
use todokv::engine::Database;
use todokv::wal::{compaction_path, WalRecovery, FILE_HEADER_SIZE, HEADER_SIZE};
use todokv::TodoKvError;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(path: &PathBuf) -> Config {
    Config::builder()
        .storage_path(path)
        .sync_strategy(SyncStrategy::EveryCommit)
        .build()
}

fn setup_temp_db() -> (TempDir, PathBuf, Database) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.db");
    let db = Database::open(test_config(&path)).unwrap();
    (temp_dir, path, db)
}

fn put(db: &Database, bucket: &str, key: &[u8], value: &[u8]) {
    db.update(|tx| {
        tx.create_bucket_if_not_exists(bucket)?;
        tx.bucket_mut(bucket)?.put(key, value)
    })
    .unwrap();
}

fn get(db: &Database, bucket: &str, key: &[u8]) -> Option<Vec<u8>> {
    db.view(|tx| Ok(tx.bucket(bucket)?.get(key).map(|v| v.to_vec())))
        .unwrap()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_open_creates_file_and_parent_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("todos.db");

    let _db = Database::open(test_config(&path)).unwrap();

    assert!(path.exists());
}

#[test]
fn test_open_path_uses_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("defaults.db");

    let db = Database::open_path(&path).unwrap();

    assert_eq!(db.path(), path.as_path());
    assert_eq!(db.config().sync_strategy, SyncStrategy::EveryCommit);
}

#[test]
fn test_open_empty_store() {
    let (_temp, _path, db) = setup_temp_db();

    let stats = db.stats();

    assert_eq!(stats.txid, 0);
    assert!(stats.buckets.is_empty());
}

#[test]
fn test_open_existing_refuses_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("typo.db");

    match Database::open_existing(test_config(&path)) {
        Err(TodoKvError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
    assert!(!path.exists());
}

#[test]
fn test_open_existing_reads_existing_file() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k", b"v");
    drop(db);

    let db = Database::open_existing(test_config(&path)).unwrap();

    assert_eq!(get(&db, "b", b"k"), Some(b"v".to_vec()));
}

#[test]
fn test_second_open_fails_with_locked() {
    let (_temp, path, _db) = setup_temp_db();

    let second = Database::open(test_config(&path));

    assert!(matches!(second, Err(TodoKvError::Locked)));
}

#[test]
fn test_close_releases_lock() {
    let (_temp, path, db) = setup_temp_db();

    db.close().unwrap();

    assert!(Database::open(test_config(&path)).is_ok());
}

#[test]
fn test_invalid_file_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("garbage.db");
    fs::write(&path, b"definitely not a store").unwrap();

    let result = Database::open(test_config(&path));

    assert!(matches!(result, Err(TodoKvError::Corruption(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_data_survives_reopen() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k1", b"v1");
    put(&db, "b", b"k2", b"v2");
    db.close().unwrap();

    let db = Database::open(test_config(&path)).unwrap();

    assert_eq!(get(&db, "b", b"k1"), Some(b"v1".to_vec()));
    assert_eq!(get(&db, "b", b"k2"), Some(b"v2".to_vec()));
    assert_eq!(db.stats().txid, 2);
}

#[test]
fn test_deletes_survive_reopen() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k", b"v");
    db.update(|tx| tx.bucket_mut("b")?.delete(b"k")).unwrap();
    drop(db);

    let db = Database::open(test_config(&path)).unwrap();

    assert_eq!(get(&db, "b", b"k"), None);
}

#[test]
fn test_sequence_survives_reopen() {
    let (_temp, path, db) = setup_temp_db();
    db.ensure_bucket("b").unwrap();
    for _ in 0..3 {
        db.update(|tx| tx.bucket_mut("b")?.next_sequence()).unwrap();
    }
    drop(db);

    let db = Database::open(test_config(&path)).unwrap();
    let next = db.update(|tx| tx.bucket_mut("b")?.next_sequence()).unwrap();

    assert_eq!(next, 4);
}

#[test]
fn test_batched_sync_survives_clean_close() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("batched.db");
    let config = Config::builder()
        .storage_path(&path)
        .sync_strategy(SyncStrategy::EveryNCommits { count: 100 })
        .build();

    let db = Database::open(config.clone()).unwrap();
    put(&db, "b", b"k", b"v");
    db.close().unwrap();

    let db = Database::open(config).unwrap();
    assert_eq!(get(&db, "b", b"k"), Some(b"v".to_vec()));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_torn_tail_is_truncated_on_open() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k1", b"v1");
    put(&db, "b", b"k2", b"v2");
    let valid_len = db.file_size();
    drop(db);

    // Simulate a crash halfway through writing a frame
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[7u8; 11]).unwrap();
    drop(file);

    let db = Database::open(test_config(&path)).unwrap();

    assert_eq!(db.file_size(), valid_len);
    assert_eq!(fs::metadata(&path).unwrap().len(), valid_len);
    assert_eq!(get(&db, "b", b"k2"), Some(b"v2".to_vec()));

    // New commits follow the surviving ones
    put(&db, "b", b"k3", b"v3");
    drop(db);
    let report = WalRecovery::verify(&path).unwrap();
    assert_eq!(report.commits_recovered, 3);
    assert!(!report.was_truncated);
}

#[test]
fn test_mid_file_corruption_is_fatal() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k1", b"v1");
    put(&db, "b", b"k2", b"v2");
    drop(db);

    let mut bytes = fs::read(&path).unwrap();
    // First payload byte of the first frame
    bytes[FILE_HEADER_SIZE as usize + HEADER_SIZE] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Database::open(test_config(&path)),
        Err(TodoKvError::Corruption(_))
    ));
}

/// Write five single-key commits; returns the offset where each frame starts
fn write_five_frames(db: &Database) -> Vec<u64> {
    (1..=5u8)
        .map(|i| {
            let start = db.file_size();
            put(db, "b", &[i], b"value");
            start
        })
        .collect()
}

fn patch_file(path: &PathBuf, offset: u64, bytes: &[u8]) {
    let mut contents = fs::read(path).unwrap();
    let offset = offset as usize;
    contents[offset..offset + bytes.len()].copy_from_slice(bytes);
    fs::write(path, &contents).unwrap();
}

#[test]
fn test_corrupt_length_mid_file_is_fatal() {
    let (_temp, path, db) = setup_temp_db();
    let starts = write_five_frames(&db);
    drop(db);
    let len_before = fs::metadata(&path).unwrap().len();

    // The len field of the second frame now points far past EOF
    patch_file(&path, starts[1] + 12, &0x00ff_ffffu32.to_le_bytes());

    assert!(matches!(
        Database::open(test_config(&path)),
        Err(TodoKvError::Corruption(_))
    ));
    // Nothing was truncated away
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_corrupt_txid_mid_file_is_fatal() {
    let (_temp, path, db) = setup_temp_db();
    let starts = write_five_frames(&db);
    drop(db);
    let len_before = fs::metadata(&path).unwrap().len();

    patch_file(&path, starts[2], &u64::MAX.to_le_bytes());

    assert!(matches!(
        Database::open(test_config(&path)),
        Err(TodoKvError::Corruption(_))
    ));
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compact_shrinks_file_and_keeps_state() {
    let (_temp, path, db) = setup_temp_db();
    for i in 0..50u32 {
        put(&db, "b", b"hot", &i.to_le_bytes());
    }

    let stats = db.compact().unwrap();

    assert!(stats.bytes_after < stats.bytes_before);
    assert_eq!(db.file_size(), stats.bytes_after);
    assert_eq!(get(&db, "b", b"hot"), Some(49u32.to_le_bytes().to_vec()));
    assert!(!compaction_path(&path).exists());

    let report = WalRecovery::verify(&path).unwrap();
    assert_eq!(report.commits_recovered, 1);
    assert_eq!(report.last_txid, 50);
}

#[test]
fn test_compact_empty_store_is_noop() {
    let (_temp, _path, db) = setup_temp_db();
    let before = db.file_size();

    let stats = db.compact().unwrap();

    assert_eq!(stats.bytes_before, before);
    assert_eq!(stats.bytes_after, before);
}

#[test]
fn test_sequence_survives_compaction() {
    let (_temp, path, db) = setup_temp_db();
    db.ensure_bucket("b").unwrap();
    for _ in 0..3 {
        db.update(|tx| {
            let mut bucket = tx.bucket_mut("b")?;
            let id = bucket.next_sequence()?;
            bucket.put(&id.to_be_bytes(), b"x")
        })
        .unwrap();
    }
    // Remove every record; only the sequence remembers the ids
    for id in 1..=3u64 {
        db.update(|tx| tx.bucket_mut("b")?.delete(&id.to_be_bytes()))
            .unwrap();
    }
    db.compact().unwrap();
    drop(db);

    let db = Database::open(test_config(&path)).unwrap();
    let next = db.update(|tx| tx.bucket_mut("b")?.next_sequence()).unwrap();

    assert_eq!(next, 4);
}

#[test]
fn test_writes_after_compaction_persist() {
    let (_temp, path, db) = setup_temp_db();
    put(&db, "b", b"k1", b"v1");
    put(&db, "b", b"k1", b"v2");
    db.compact().unwrap();
    put(&db, "b", b"k2", b"v3");
    drop(db);

    let db = Database::open(test_config(&path)).unwrap();

    assert_eq!(get(&db, "b", b"k1"), Some(b"v2".to_vec()));
    assert_eq!(get(&db, "b", b"k2"), Some(b"v3".to_vec()));
    assert_eq!(db.stats().txid, 3);
}

#[test]
fn test_open_compacts_past_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auto.db");
    let config = Config::builder()
        .storage_path(&path)
        .compaction_threshold(512)
        .build();

    {
        let db = Database::open(
            Config::builder()
                .storage_path(&path)
                .compaction_threshold(u64::MAX)
                .build(),
        )
        .unwrap();
        for i in 0..40u32 {
            put(&db, "b", b"k", &i.to_le_bytes());
        }
        assert!(db.file_size() > 512);
    }

    let db = Database::open(config).unwrap();

    assert_eq!(WalRecovery::verify(&path).unwrap().commits_recovered, 1);
    assert_eq!(get(&db, "b", b"k"), Some(39u32.to_le_bytes().to_vec()));
}

// =============================================================================
// Stats Tests
// =============================================================================

#[test]
fn test_stats_reports_buckets() {
    let (_temp, _path, db) = setup_temp_db();
    put(&db, "alpha", b"k", b"v");
    put(&db, "beta", b"k1", b"v");
    put(&db, "beta", b"k2", b"v");

    let stats = db.stats();

    let names: Vec<&str> = stats.buckets.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert_eq!(stats.buckets[1].entries, 2);
    assert_eq!(stats.buckets[1].size, 2 + 1 + 2 + 1);
    assert_eq!(stats.file_size, db.file_size());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_are_serialized() {
    let (_temp, path, db) = setup_temp_db();
    db.ensure_bucket("b").unwrap();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..25 {
                    db.update(|tx| {
                        let mut bucket = tx.bucket_mut("b")?;
                        let id = bucket.next_sequence()?;
                        bucket.put(&id.to_be_bytes(), b"x")
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let count = db.view(|tx| Ok(tx.bucket("b")?.len())).unwrap();
    assert_eq!(count, 200);
    drop(db);

    // Every commit made it to disk, in txid order
    let report = WalRecovery::verify(&path).unwrap();
    assert_eq!(report.commits_recovered, 201);
}

#[test]
fn test_readers_run_during_writes() {
    let (_temp, _path, db) = setup_temp_db();
    put(&db, "b", b"counter", &0u64.to_be_bytes());
    let db = Arc::new(db);

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 1..=100u64 {
                put(&db, "b", b"counter", &i.to_be_bytes());
            }
        })
    };

    let mut last = 0u64;
    for _ in 0..100 {
        let value = get(&db, "b", b"counter").unwrap();
        let current = u64::from_be_bytes(value.try_into().unwrap());
        // Readers only ever see committed values, moving forward
        assert!(current >= last);
        last = current;
    }
    writer.join().unwrap();

    assert_eq!(get(&db, "b", b"counter"), Some(100u64.to_be_bytes().to_vec()));
}
