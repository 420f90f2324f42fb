//! Commit log writer
//!
//! Owns the storage file: holds its exclusive lock, appends commit frames
//! and rewrites the file during compaction.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::SyncStrategy;
use crate::error::{Result, TodoKvError};

use super::entry::{check_file_header, file_header, Commit, FILE_HEADER_SIZE};

/// Appends commit frames to the storage file
pub struct WalWriter {
    /// Locked, append-mode handle to the storage file
    file: File,

    /// Storage file path
    path: PathBuf,

    /// When to fsync appended frames
    sync_strategy: SyncStrategy,

    /// Frames appended since the last fsync
    unsynced: usize,

    /// Current file length (end of the last complete frame)
    len: u64,

    /// Set when a failed append could not be rolled back
    broken: bool,
}

impl WalWriter {
    /// Open or create the storage file and take its exclusive lock
    ///
    /// A new (or header-less) file gets a fresh header. Returns
    /// `TodoKvError::Locked` if another handle already holds the file.
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| TodoKvError::Locked)?;

        let mut writer = Self {
            len: file.metadata()?.len(),
            file,
            path: path.to_path_buf(),
            sync_strategy,
            unsynced: 0,
            broken: false,
        };
        writer.ensure_header()?;

        Ok(writer)
    }

    /// Create (or truncate) a file containing only a header, locked
    fn create_fresh(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| TodoKvError::Locked)?;
        file.set_len(0)?;

        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            sync_strategy,
            unsynced: 0,
            len: 0,
            broken: false,
        };
        writer.ensure_header()?;

        Ok(writer)
    }

    /// Write the file header if the file is empty or holds a torn header
    fn ensure_header(&mut self) -> Result<()> {
        let expected = file_header();

        if self.len >= FILE_HEADER_SIZE {
            let mut existing = [0u8; FILE_HEADER_SIZE as usize];
            self.file.seek(SeekFrom::Start(0))?;
            self.file.read_exact(&mut existing)?;
            return check_file_header(&existing);
        }

        // A crash during creation can leave a prefix of the header behind
        if self.len > 0 {
            let mut existing = vec![0u8; self.len as usize];
            self.file.seek(SeekFrom::Start(0))?;
            self.file.read_exact(&mut existing)?;
            if existing[..] != expected[..existing.len()] {
                return Err(TodoKvError::Corruption(format!(
                    "storage file too short ({} bytes) and not a header prefix",
                    self.len
                )));
            }
            self.file.set_len(0)?;
        }

        self.file.write_all(&expected)?;
        self.file.sync_all()?;
        self.len = FILE_HEADER_SIZE;

        Ok(())
    }

    /// Append a commit frame
    ///
    /// On a failed write the file is cut back to its previous length so a
    /// half-written frame never precedes later commits. If that cut fails
    /// too, the writer refuses every later append.
    pub fn append(&mut self, commit: &Commit) -> Result<u64> {
        if self.broken {
            return Err(TodoKvError::Io(io::Error::new(
                io::ErrorKind::Other,
                "commit log holds a partial frame that could not be rolled back",
            )));
        }

        let frame = commit.encode()?;

        if let Err(e) = self.file.write_all(&frame) {
            self.rollback();
            return Err(e.into());
        }
        self.len += frame.len() as u64;
        self.unsynced += 1;

        let must_sync = match self.sync_strategy {
            SyncStrategy::EveryCommit => true,
            SyncStrategy::EveryNCommits { count } => self.unsynced >= count,
        };
        if must_sync {
            if let Err(e) = self.sync() {
                self.len -= frame.len() as u64;
                self.rollback();
                return Err(e);
            }
        }

        Ok(self.len)
    }

    /// Cut the file back to the end of the last complete frame
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            tracing::error!(
                path = %self.path.display(),
                len = self.len,
                error = %e,
                "cannot roll back partial frame, refusing further appends"
            );
            self.broken = true;
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop everything past `len` (used to discard a torn tail)
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        if len < FILE_HEADER_SIZE {
            return Err(TodoKvError::Corruption(format!(
                "refusing to truncate into the file header (len {})",
                len
            )));
        }
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        self.unsynced = 0;
        Ok(())
    }

    /// Replace the whole file with a single commit frame
    ///
    /// Steps:
    /// 1. Write header + frame into a locked sibling temp file and fsync
    /// 2. Atomically rename it over the storage file
    /// 3. Continue appending to the new file
    pub fn rewrite(&mut self, commit: &Commit) -> Result<()> {
        let temp_path = compaction_path(&self.path);

        let mut replacement = Self::create_fresh(&temp_path, SyncStrategy::EveryCommit)?;
        replacement.append(commit)?;

        fs::rename(&temp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        replacement.path = self.path.clone();
        replacement.sync_strategy = self.sync_strategy;
        // The old handle (and its lock on the replaced inode) is released here
        *self = replacement;

        Ok(())
    }

    /// Current file length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if the file holds no frames
    pub fn is_empty(&self) -> bool {
        self.len <= FILE_HEADER_SIZE
    }

    /// Storage file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sibling path used while compacting `path`
pub fn compaction_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
