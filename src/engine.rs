//! Engine Module
//!
//! The embedded store that coordinates the commit log and snapshots.
//!
//! ## Responsibilities
//! - Open (or create) and lock the storage file
//! - Recover committed state on startup, cutting off torn writes
//! - Run read transactions against immutable snapshots
//! - Serialize write transactions and make each one atomic and durable
//! - Compact the log when it grows

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, TodoKvError};
use crate::snapshot::Snapshot;
use crate::transaction::{ReadTx, WriteTx};
use crate::wal::{WalRecovery, WalWriter};

/// The embedded transactional store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (`update`): Serialized by the `writer` mutex
///   - Only ONE write transaction at a time
///   - Order: writer lock → run closure → append frame → publish snapshot
///
/// - **Reads** (`view`): Never wait for a write transaction
///   - `current` is read-locked only long enough to clone an `Arc`, and
///     write-locked only while a committed frame is applied in memory
///   - A reader keeps its snapshot for as long as it runs, so commits that
///     land meanwhile are invisible to it
///
/// Commit frames only name buckets that exist in the base snapshot or are
/// created earlier in the same frame, so applying one cannot fail halfway.
pub struct Database {
    /// Engine configuration
    config: Config,

    /// Commit log; holding this lock is holding the write transaction
    writer: Mutex<WalWriter>,

    /// Latest committed snapshot
    current: RwLock<Arc<Snapshot>>,
}

/// Per-bucket summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub name: String,
    pub entries: usize,
    pub sequence: u64,
    pub size: usize,
}

/// Store-wide summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Id of the latest commit
    pub txid: u64,

    /// Storage file length in bytes
    pub file_size: u64,

    /// One entry per bucket, ordered by name
    pub buckets: Vec<BucketStats>,
}

/// Outcome of a compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl Database {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create the parent directory if it doesn't exist
    /// 2. Open and lock the storage file
    /// 3. Replay committed frames, cutting off a torn tail
    /// 4. Compact if the log outgrew the threshold
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Parent directory
        if let Some(parent) = config.storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Step 2: Lock the file (fails fast if another handle owns it)
        let mut writer = WalWriter::open(&config.storage_path, config.sync_strategy)?;

        // Step 3: Recover
        let (commits, recovery) = WalRecovery::recover(&config.storage_path)?;
        if recovery.was_truncated {
            tracing::warn!(
                path = %config.storage_path.display(),
                valid_len = recovery.valid_len,
                "discarding torn commit frame at end of storage file"
            );
            writer.truncate_to(recovery.valid_len)?;
        }

        let mut snapshot = Snapshot::new();
        for commit in &commits {
            snapshot.apply(commit)?;
        }

        tracing::info!(
            path = %config.storage_path.display(),
            commits = recovery.commits_recovered,
            txid = snapshot.txid(),
            "storage file opened"
        );

        let db = Self {
            config,
            writer: Mutex::new(writer),
            current: RwLock::new(Arc::new(snapshot)),
        };

        // Step 4: Compact a log that has grown past the threshold
        if commits.len() > 1 && db.file_size() > db.config.compaction_threshold {
            db.compact()?;
        }

        Ok(db)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified storage file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().storage_path(path).build();
        Self::open(config)
    }

    /// Open a storage file that must already exist
    ///
    /// Unlike `open`, a missing file is an `Io` error of kind `NotFound`
    /// and nothing is created.
    pub fn open_existing(config: Config) -> Result<Self> {
        if !config.storage_path.is_file() {
            return Err(TodoKvError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no storage file at {}", config.storage_path.display()),
            )));
        }
        Self::open(config)
    }

    /// Create a bucket if it does not exist yet (idempotent)
    pub fn ensure_bucket(&self, name: &str) -> Result<()> {
        self.update(|tx| tx.create_bucket_if_not_exists(name))
    }

    /// Begin a read transaction held by the caller
    pub fn begin_read(&self) -> ReadTx {
        ReadTx::new(Arc::clone(&self.current.read()))
    }

    /// Run `f` against a consistent snapshot
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTx) -> Result<T>,
    {
        let tx = self.begin_read();
        f(&tx)
    }

    /// Run `f` as one atomic, serialized write transaction
    ///
    /// Steps:
    /// 1. Acquire the writer lock
    /// 2. Run `f` against the latest snapshot plus its own pending writes
    /// 3. On error, drop everything `f` did and return the error unchanged
    /// 4. Append the commit frame (durability first)
    /// 5. Apply it to the published snapshot
    ///
    /// Calling `update` again from inside `f` deadlocks.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTx) -> Result<T>,
    {
        let mut writer = self.writer.lock();

        let base = Arc::clone(&self.current.read());
        let txid = base.txid() + 1;
        let mut tx = WriteTx::new(base);

        let output = f(&mut tx)?;

        let commit = match tx.into_commit(txid) {
            Some(commit) => commit,
            None => return Ok(output),
        };

        writer.append(&commit)?;

        // Buckets are only copied here if a reader still holds them
        {
            let mut current = self.current.write();
            Arc::make_mut(&mut *current).apply(&commit)?;
        }

        tracing::trace!(txid, operations = commit.operations.len(), "committed");

        Ok(output)
    }

    /// Rewrite the storage file as a single frame holding current state
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut writer = self.writer.lock();
        let bytes_before = writer.len();

        let snapshot = Arc::clone(&self.current.read());
        if snapshot.txid() == 0 {
            return Ok(CompactionStats {
                bytes_before,
                bytes_after: bytes_before,
            });
        }

        writer.rewrite(&snapshot.to_commit())?;
        let bytes_after = writer.len();

        tracing::info!(bytes_before, bytes_after, txid = snapshot.txid(), "storage file compacted");

        Ok(CompactionStats {
            bytes_before,
            bytes_after,
        })
    }

    /// Force frames written under a relaxed sync strategy to disk
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// Close the store gracefully
    ///
    /// Syncs the file and releases its lock
    pub fn close(self) -> Result<()> {
        self.writer.lock().sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Summary of buckets, sequences and file size
    pub fn stats(&self) -> DatabaseStats {
        let snapshot = Arc::clone(&self.current.read());
        let buckets = snapshot
            .buckets()
            .map(|(name, table)| BucketStats {
                name: name.to_string(),
                entries: table.len(),
                sequence: table.sequence(),
                size: table.size(),
            })
            .collect();

        DatabaseStats {
            txid: snapshot.txid(),
            file_size: self.file_size(),
            buckets,
        }
    }

    /// Storage file length in bytes
    pub fn file_size(&self) -> u64 {
        self.writer.lock().len()
    }

    /// Storage file path
    pub fn path(&self) -> &Path {
        &self.config.storage_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
