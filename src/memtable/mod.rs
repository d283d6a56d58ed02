//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Hold the newest value (or tombstone) per key in sorted order
//! - Track an approximate serialized size for flush triggers
//! - Hand out cheap snapshot scans for reads and flushes
//!
//! ## Data Structure Choice
//! `BTreeMap` behind an `Arc`:
//! - Ordered keys (required for SSTable generation)
//! - Scans clone the `Arc` and walk it lazily
//! - Writes copy the map only while a scan still holds the old one

mod table;

pub use table::{MemTable, MemTableIterator, BASELINE_SIZE, ENTRY_OVERHEAD};
