//! Snapshot Module
//!
//! Immutable, point-in-time view of every bucket's committed state.
//!
//! ## Responsibilities
//! - Hold committed buckets in key order
//! - Apply commit frames (on replay and after each write transaction)
//! - Produce a single compacted commit of the whole state
//!
//! ## Sharing
//! Buckets sit behind `Arc` so that handing a snapshot to a reader is an
//! `Arc` clone. Applying a commit clones only the buckets it touches, and
//! only when a reader still holds the previous version.

mod table;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, TodoKvError};
use crate::wal::{Commit, Operation};

pub use table::BucketTable;

/// Committed state of the whole store at one transaction id
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Id of the last commit applied
    txid: u64,

    /// Buckets by name
    buckets: BTreeMap<String, Arc<BucketTable>>,
}

impl Snapshot {
    /// Create an empty snapshot (no buckets, txid 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last commit applied
    pub fn txid(&self) -> u64 {
        self.txid
    }

    /// Look up a bucket by name
    pub fn bucket(&self, name: &str) -> Option<&BucketTable> {
        self.buckets.get(name).map(|b| b.as_ref())
    }

    /// Bucket names in ascending order
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(|k| k.as_str())
    }

    /// Iterate buckets in name order
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &BucketTable)> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Approximate size of all entries in bytes
    pub fn size(&self) -> usize {
        self.buckets.values().map(|b| b.size()).sum()
    }

    /// Apply a commit on top of this snapshot
    ///
    /// Fails (leaving a partially applied snapshot) if an operation names a
    /// bucket that does not exist; callers apply to a scratch copy or treat
    /// the failure as corruption.
    pub fn apply(&mut self, commit: &Commit) -> Result<()> {
        for op in &commit.operations {
            match op {
                Operation::CreateBucket { bucket } => {
                    self.buckets.entry(bucket.clone()).or_default();
                }
                Operation::Put { bucket, key, value } => {
                    self.bucket_mut(bucket)?.put(key.clone(), value.clone());
                }
                Operation::Delete { bucket, key } => {
                    self.bucket_mut(bucket)?.delete(key);
                }
                Operation::SetSequence { bucket, value } => {
                    self.bucket_mut(bucket)?.set_sequence(*value);
                }
            }
        }
        self.txid = commit.txid;
        Ok(())
    }

    /// Express the whole state as one commit carrying the current txid
    pub fn to_commit(&self) -> Commit {
        let mut operations = Vec::new();
        for (name, table) in &self.buckets {
            operations.push(Operation::CreateBucket {
                bucket: name.clone(),
            });
            if table.sequence() > 0 {
                operations.push(Operation::SetSequence {
                    bucket: name.clone(),
                    value: table.sequence(),
                });
            }
            for (key, value) in table.iter() {
                operations.push(Operation::Put {
                    bucket: name.clone(),
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        Commit::new(self.txid, operations)
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut BucketTable> {
        self.buckets
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| TodoKvError::BucketNotFound(name.to_string()))
    }
}
