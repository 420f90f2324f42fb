//! Bucket table implementation
//!
//! BTreeMap-based ordered table for one bucket's committed entries.

use std::collections::btree_map;
use std::collections::BTreeMap;

/// Committed contents of a single bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketTable {
    /// Ordered key → value entries
    entries: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Last value handed out by the bucket's sequence
    sequence: u64,

    /// Approximate size in bytes (keys + values)
    size: usize,
}

impl BucketTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Put a key-value pair
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len();
        let value_len = value.len();
        match self.entries.insert(key, value) {
            // Key bytes were already counted
            Some(old) => self.size = self.size - old.len() + value_len,
            None => self.size += key_len + value_len,
        }
    }

    /// Delete a key, returning whether it was present
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.size = self.size.saturating_sub(key.len() + old.len());
                true
            }
            None => false,
        }
    }

    /// Last sequence value handed out
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Overwrite the sequence counter
    pub fn set_sequence(&mut self, value: u64) {
        self.sequence = value;
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Iterate entries in ascending key order
    pub fn iter(&self) -> btree_map::Iter<'_, Vec<u8>, Vec<u8>> {
        self.entries.iter()
    }
}
