//! Record Model
//!
//! Keys, timestamped values and the `Cell` pairs produced while scanning.
//!
//! ## Ordering
//! - Keys: unsigned lexicographic byte order
//! - Values: timestamp DESCENDING (newest first), see `Value::cmp_recency`
//! - Cells: key ascending, then value recency, see `Cell::cmp_merge`
//!
//! This puts the most recent version of a key in front of every older
//! version during a merge.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::Result;

/// Raw key bytes
pub type Key = Bytes;

/// A timestamped payload; `None` is a tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    timestamp: u64,
    payload: Option<Bytes>,
}

impl Value {
    /// A live value
    pub fn live(timestamp: u64, payload: Bytes) -> Self {
        debug_assert!(timestamp > 0, "timestamps start at 1");
        Self {
            timestamp,
            payload: Some(payload),
        }
    }

    /// A deletion marker
    pub fn tombstone(timestamp: u64) -> Self {
        debug_assert!(timestamp > 0, "timestamps start at 1");
        Self {
            timestamp,
            payload: None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Payload bytes, `None` for a tombstone
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Bytes> {
        self.payload
    }

    /// Payload length used for size accounting (0 for tombstones)
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    /// Recency order: the newer timestamp sorts first
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        other.timestamp.cmp(&self.timestamp)
    }
}

/// A `(key, value)` pair materialized during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub key: Key,
    pub value: Value,
}

impl Cell {
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }

    /// Merge order: key ascending, then most recent value first
    pub fn cmp_merge(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.value.cmp_recency(&other.value))
    }
}

// =============================================================================
// Write Timestamps
// =============================================================================

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Next write timestamp: wall-clock nanoseconds, strictly increasing
/// within the process even if the clock stalls or steps back.
pub fn next_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut last = LAST_TIMESTAMP.load(AtomicOrdering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(
            last,
            candidate,
            AtomicOrdering::SeqCst,
            AtomicOrdering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

// =============================================================================
// Read-Only Table Capability
// =============================================================================

/// Lazy, owned stream of cells in ascending key order
pub type CellIter = Box<dyn Iterator<Item = Result<Cell>> + Send>;

/// Read capability shared by the memtable and on-disk tables.
///
/// Mutation lives on `MemTable` alone; SSTables have no write methods.
pub trait Table {
    /// Cells with key >= `from`, ascending. Each call starts a fresh scan.
    fn scan_from(&self, from: &[u8]) -> Result<CellIter>;

    /// Number of distinct keys (rows) held
    fn entry_count(&self) -> usize;
}
