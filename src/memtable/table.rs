//! MemTable implementation
//!
//! Copy-on-write BTreeMap with byte-size accounting.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::types::{next_timestamp, Cell, CellIter, Key, Table, Value};

/// Size estimate of an empty memtable
pub const BASELINE_SIZE: usize = 720;

/// Fixed per-entry cost added for every distinct key
pub const ENTRY_OVERHEAD: usize = 8;

/// In-memory table for recent writes
///
/// Not synchronized on its own: the engine owns it behind its state lock.
#[derive(Debug, Clone)]
pub struct MemTable {
    /// Newest value per key
    data: Arc<BTreeMap<Key, Value>>,
    /// Approximate serialized size in bytes
    size: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: Arc::new(BTreeMap::new()),
            size: BASELINE_SIZE,
        }
    }

    /// Insert or overwrite `key` with a live value stamped now.
    ///
    /// Returns the new size estimate.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) -> usize {
        let value = Value::live(next_timestamp(), Bytes::copy_from_slice(value));
        self.insert(key, value)
    }

    /// Insert or overwrite `key` with a tombstone stamped now.
    ///
    /// Returns the new size estimate.
    pub fn remove(&mut self, key: &[u8]) -> usize {
        self.insert(key, Value::tombstone(next_timestamp()))
    }

    /// Shared accounting for upsert/remove
    ///
    /// - New key: key_len + payload_len + ENTRY_OVERHEAD
    /// - Existing key: payload delta only
    fn insert(&mut self, key: &[u8], value: Value) -> usize {
        let new_len = value.payload_len();
        let data = Arc::make_mut(&mut self.data);

        match data.get_mut(key) {
            Some(existing) => {
                let old_len = existing.payload_len();
                self.size = self.size - old_len + new_len;
                *existing = value;
            }
            None => {
                self.size += key.len() + new_len + ENTRY_OVERHEAD;
                data.insert(Bytes::copy_from_slice(key), value);
            }
        }

        self.size
    }

    /// Look up the current value for `key`, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get approximate size in bytes
    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    /// Number of distinct keys held
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot iterator over entries with key >= `from`, ascending
    ///
    /// Later writes to this memtable are not visible to the iterator.
    pub fn iter_from(&self, from: &[u8]) -> MemTableIterator {
        MemTableIterator {
            data: Arc::clone(&self.data),
            lower: Bound::Included(Bytes::copy_from_slice(from)),
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Table for MemTable {
    fn scan_from(&self, from: &[u8]) -> Result<CellIter> {
        Ok(Box::new(self.iter_from(from).map(Ok)))
    }

    fn entry_count(&self) -> usize {
        self.data.len()
    }
}

/// Iterator over a MemTable snapshot
///
/// Owns its snapshot, so it can outlive the lock that produced it.
pub struct MemTableIterator {
    data: Arc<BTreeMap<Key, Value>>,
    /// Lower bound of the next lookup
    lower: Bound<Key>,
}

impl Iterator for MemTableIterator {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self
            .data
            .range::<Key, _>((self.lower.clone(), Bound::Unbounded))
            .next()?;

        self.lower = Bound::Excluded(key.clone());
        Some(Cell::new(key.clone(), value.clone()))
    }
}
