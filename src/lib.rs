//! # lsmkv
//!
//! An embedded, ordered key-value storage engine built on the
//! Log-Structured Merge pattern:
//! - Writes land in a sorted in-memory memtable
//! - Full memtables are flushed to immutable SSTables (`<generation>.dat`)
//! - Reads merge the memtable with every table, newest data winning
//! - Deletes are tombstones that shadow older values
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            (Single Writer / Multi Reader, snapshots)         │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ put / delete                     │ scan / get / range
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │    MemTable     │───────────────►│  Merge-Scan     │
//!   │ (BTreeMap, COW) │                │ (k-way, dedup,  │
//!   └────────┬────────┘                │  tombstones)    │
//!            │ flush > threshold       └────────▲────────┘
//!            ▼                                  │
//!   ┌─────────────────┐                         │
//!   │ StorageManager  │─────────────────────────┘
//!   │ gen → SSTable   │
//!   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod types;
pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use engine::{Engine, Scan};
pub use types::{Cell, Table, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lsmkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
