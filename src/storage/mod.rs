//! Storage Module
//!
//! Persistent storage layer: immutable SSTables plus the merge that
//! combines them with the memtable.
//!
//! ## Responsibilities
//! - Serialize sorted cells into the SSTable layout
//! - Binary-search and scan existing tables
//! - Track tables by generation and install new ones atomically
//! - Merge per-source scans into one live, deduplicated view
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── 0.dat     oldest table
//!   ├── 1.dat
//!   ├── 3.dat     newest table (gaps are fine)
//!   └── 4.tmp     flush in progress; never loaded
//! ```

pub mod sstable;
mod manager;
mod merge;

pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, TableSummary};
pub use manager::{StorageManager, TABLE_SUFFIX, TEMP_SUFFIX};
pub use merge::{LiveEntries, MergeIterator};
