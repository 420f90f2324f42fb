//! Read and write transactions
//!
//! A [`ReadTx`] wraps an immutable [`Snapshot`]. A [`WriteTx`] layers
//! pending writes over the snapshot it started from; nothing it does is
//! visible to anyone else until the engine commits it.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, TodoKvError};
use crate::snapshot::{BucketTable, Snapshot};
use crate::wal::{Commit, Operation};

// =============================================================================
// Read Transactions
// =============================================================================

/// A consistent, point-in-time view of the store
pub struct ReadTx {
    snapshot: Arc<Snapshot>,
}

impl ReadTx {
    pub(crate) fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    /// Open a bucket for reading
    pub fn bucket(&self, name: &str) -> Result<Bucket<'_>> {
        self.snapshot
            .bucket(name)
            .map(|table| Bucket { table })
            .ok_or_else(|| TodoKvError::BucketNotFound(name.to_string()))
    }

    /// Id of the commit this view was taken at
    pub fn txid(&self) -> u64 {
        self.snapshot.txid()
    }

    /// Names of all buckets in this view
    pub fn bucket_names(&self) -> Vec<String> {
        self.snapshot.bucket_names().map(str::to_string).collect()
    }
}

/// Read-only handle to one bucket inside a [`ReadTx`]
#[derive(Clone, Copy)]
pub struct Bucket<'tx> {
    table: &'tx BucketTable,
}

impl<'tx> Bucket<'tx> {
    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&'tx [u8]> {
        self.table.get(key)
    }

    /// Iterate entries in ascending key order
    pub fn iter(&self) -> BucketIter<'tx> {
        BucketIter {
            inner: self.table.iter(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Last value handed out by the bucket's sequence
    pub fn sequence(&self) -> u64 {
        self.table.sequence()
    }
}

/// Ordered iterator over a bucket's entries
pub struct BucketIter<'tx> {
    inner: btree_map::Iter<'tx, Vec<u8>, Vec<u8>>,
}

impl<'tx> Iterator for BucketIter<'tx> {
    type Item = (&'tx [u8], &'tx [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

// =============================================================================
// Write Transactions
// =============================================================================

/// Uncommitted changes to one bucket
#[derive(Debug, Default)]
struct PendingBucket {
    /// Bucket is created by this transaction
    created: bool,

    /// Key → new value (`None` = delete)
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,

    /// New sequence value, if advanced
    sequence: Option<u64>,
}

/// An exclusive, atomic unit of writes
///
/// Only obtainable through `Database::update`, which holds the single
/// writer lock for the lifetime of the transaction.
pub struct WriteTx {
    base: Arc<Snapshot>,
    pending: BTreeMap<String, PendingBucket>,
}

impl WriteTx {
    pub(crate) fn new(base: Arc<Snapshot>) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }

    /// Create a bucket unless it already exists
    pub fn create_bucket_if_not_exists(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(TodoKvError::InvalidBucketName(name.to_string()));
        }
        if self.base.bucket(name).is_none() {
            self.pending.entry(name.to_string()).or_default().created = true;
        }
        Ok(())
    }

    /// Open a bucket for reading and writing
    pub fn bucket_mut(&mut self, name: &str) -> Result<BucketMut<'_>> {
        let base = self.base.bucket(name);
        let created = self.pending.get(name).map_or(false, |p| p.created);
        if base.is_none() && !created {
            return Err(TodoKvError::BucketNotFound(name.to_string()));
        }

        let pending = self.pending.entry(name.to_string()).or_default();
        Ok(BucketMut {
            name: name.to_string(),
            base,
            pending,
        })
    }

    /// Id of the commit this transaction started from
    pub fn base_txid(&self) -> u64 {
        self.base.txid()
    }

    /// Turn pending changes into a commit, or `None` if nothing changed
    pub(crate) fn into_commit(self, txid: u64) -> Option<Commit> {
        let mut operations = Vec::new();

        for (name, pending) in self.pending {
            let base = self.base.bucket(&name);

            if pending.created {
                operations.push(Operation::CreateBucket {
                    bucket: name.clone(),
                });
            }
            if let Some(value) = pending.sequence {
                operations.push(Operation::SetSequence {
                    bucket: name.clone(),
                    value,
                });
            }
            for (key, write) in pending.writes {
                match write {
                    Some(value) => operations.push(Operation::Put {
                        bucket: name.clone(),
                        key,
                        value,
                    }),
                    None => {
                        // Deleting a key the base never had is a no-op
                        if base.map_or(false, |b| b.contains_key(&key)) {
                            operations.push(Operation::Delete {
                                bucket: name.clone(),
                                key,
                            });
                        }
                    }
                }
            }
        }

        if operations.is_empty() {
            None
        } else {
            Some(Commit::new(txid, operations))
        }
    }
}

/// Read-write handle to one bucket inside a [`WriteTx`]
///
/// Reads see the transaction's own pending writes first.
pub struct BucketMut<'tx> {
    name: String,
    base: Option<&'tx BucketTable>,
    pending: &'tx mut PendingBucket,
}

impl<'tx> BucketMut<'tx> {
    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.pending.writes.get(key) {
            Some(Some(value)) => Some(value.as_slice()),
            Some(None) => None,
            None => self.base.and_then(|b| b.get(key)),
        }
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Put a key-value pair
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending
            .writes
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Delete a key, returning whether it was present
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let existed = self.contains_key(key);
        self.pending.writes.insert(key.to_vec(), None);
        Ok(existed)
    }

    /// Advance the bucket's sequence and return the new value
    ///
    /// The value is persisted in the same commit as the rest of the
    /// transaction; an aborted transaction hands out nothing.
    pub fn next_sequence(&mut self) -> Result<u64> {
        let next = self
            .sequence()
            .checked_add(1)
            .ok_or_else(|| TodoKvError::SequenceExhausted(self.name.clone()))?;
        self.pending.sequence = Some(next);
        Ok(next)
    }

    /// Current sequence value (including this transaction's advances)
    pub fn sequence(&self) -> u64 {
        self.pending
            .sequence
            .unwrap_or_else(|| self.base.map_or(0, |b| b.sequence()))
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }
}
