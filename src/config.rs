//! Configuration for lsmkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for an lsmkv instance
///
/// There is no synchronization setting: an `Engine` always locks
/// internally (one writer at a time, readers on consistent snapshots),
/// so it can be shared across threads behind an `Arc` without any
/// external locking.
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the table files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0.dat        (generation 0)
    ///     ├── 1.dat        (generation 1)
    ///     └── 2.tmp        (flush in progress, ignored on open)
    pub data_dir: PathBuf,

    /// Create `data_dir` on open when it does not exist yet
    pub create_if_missing: bool,

    /// fsync the table file before the rename and the directory after it
    pub sync_on_flush: bool,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Flush once the memtable estimate grows past this many bytes
    pub flush_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lsmkv_data"),
            create_if_missing: true,
            sync_on_flush: true,
            flush_threshold: 4 * 1024 * 1024, // 4 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(KvError::Config(
                "flush_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (where table files live)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.config.flush_threshold = bytes;
        self
    }

    /// Create the data directory if it is missing
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// fsync table files and the directory during flush
    pub fn sync_on_flush(mut self, sync: bool) -> Self {
        self.config.sync_on_flush = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
