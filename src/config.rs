//! Configuration for todokv
//!
//! Centralized configuration with sensible defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Result, TodoKvError};

/// Main configuration for a todokv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the single storage file (header + commit frames)
    pub storage_path: PathBuf,

    /// Sync strategy: how often to fsync commit frames
    pub sync_strategy: SyncStrategy,

    /// Log size (in bytes) above which the file is compacted on open
    pub compaction_threshold: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,

    /// Runtime worker threads, also the cap on concurrent storage calls
    pub worker_threads: usize,

    /// Open connections served at once; further ones get a 503
    pub max_connections: usize,

    /// Time a client gets to send a complete request head (milliseconds, 0 = no limit)
    pub read_timeout_ms: u64,

    /// Largest accepted request body (bytes)
    pub max_body_size: usize,
}

/// Commit sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every commit (safest, slowest)
    EveryCommit,

    /// fsync after N commits (balanced durability/performance)
    EveryNCommits { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("todos.db"),
            sync_strategy: SyncStrategy::EveryCommit,
            compaction_threshold: 4 * 1024 * 1024, // 4 MB
            listen_addr: "0.0.0.0:8080".to_string(),
            worker_threads: 8,
            max_connections: 1024,
            read_timeout_ms: 5000,
            max_body_size: 1024 * 1024, // 1 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would otherwise fail late (at bind or first request)
    pub fn validate(&self) -> Result<()> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(TodoKvError::Config("storage path is empty".to_string()));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(TodoKvError::Config(format!(
                "invalid listen address: {}",
                self.listen_addr
            )));
        }
        if self.worker_threads == 0 {
            return Err(TodoKvError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(TodoKvError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if let SyncStrategy::EveryNCommits { count: 0 } = self.sync_strategy {
            return Err(TodoKvError::Config(
                "EveryNCommits count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage file path
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the compaction threshold (in bytes)
    pub fn compaction_threshold(mut self, bytes: u64) -> Self {
        self.config.compaction_threshold = bytes;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the number of connections served at once
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the maximum request body size (in bytes)
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
