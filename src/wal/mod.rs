//! Commit Log Module
//!
//! The storage file is an append-only log of committed write transactions.
//!
//! ## Responsibilities
//! - Append one frame per commit before the commit becomes visible
//! - CRC32 checksums for corruption detection
//! - Strictly increasing transaction ids for ordering
//! - Crash recovery and replay
//! - Compaction into a single frame
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header: Magic "TKVL" (4) | Version (2)  │
//! ├─────────────────────────────────────────┤
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │TxId (8) │ CRC (4) │Len (4) │ Commit │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │TxId (8) │ CRC (4) │Len (4) │ Commit │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{Commit, Operation, FILE_HEADER_SIZE, HEADER_SIZE};
pub use writer::{compaction_path, WalWriter};
pub use reader::{Frame, WalReader};
pub use recovery::{WalRecovery, RecoveryResult};
