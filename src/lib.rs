//! # TodoKV
//!
//! A Todo-list HTTP service backed by an embedded, transactional key-value
//! store:
//! - Append-only commit log for durability
//! - Crash recovery with torn-tail truncation
//! - Single-writer/multi-reader snapshot isolation
//! - JSON over HTTP/1.1 with Prometheus counters
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │          (tokio accept loop + hyper HTTP/1.1)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Dispatcher                                │
//! │            (routing, status codes, metrics)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  TodoRepository                              │
//! │           (bucket "todos", 8-byte BE ids)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Commit Log │          │  Snapshot   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod snapshot;
pub mod transaction;
pub mod engine;

pub mod keys;
pub mod model;
pub mod repository;

pub mod metrics;
pub mod protocol;
pub mod dispatcher;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TodoKvError};
pub use config::{Config, SyncStrategy};
pub use engine::Database;
pub use transaction::{ReadTx, WriteTx};
pub use model::{Todo, TodoPatch};
pub use repository::TodoRepository;
pub use metrics::Metrics;
pub use dispatcher::Dispatcher;
pub use network::{Server, ShutdownHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TodoKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
