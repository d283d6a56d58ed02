//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! All integers are big-endian.
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Data Region (variable)                                          │
//! │   [KeyLen: u32][Key][Timestamp: u64][Tombstone: u8]             │
//! │       followed by [ValLen: u32][Value] only when Tombstone == 0 │
//! │   ... repeated for each row, ascending key order ...            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Offset Array (4 * RowCount bytes)                               │
//! │   [Offset: u32] byte position of each row from file start       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Trailer (4 bytes)                                               │
//! │   RowCount: u32                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no header, magic or checksum: a reader starts from the last
//! four bytes and derives everything else from the row count.

mod builder;
mod iterator;
mod reader;

pub use builder::{serialize, SSTableBuilder, TableSummary};
pub use iterator::SSTableIterator;
pub use reader::SSTable;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Size of every length, offset and count field
pub(crate) const U32_SIZE: u64 = 4;

/// Fixed part of a row besides the key: KeyLen (4) + Timestamp (8) + Tombstone (1)
pub(crate) const ROW_FIXED_SIZE: u64 = 4 + 8 + 1;

/// Tombstone flag values
pub(crate) const FLAG_LIVE: u8 = 0;
pub(crate) const FLAG_TOMBSTONE: u8 = 1;
