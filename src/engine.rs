//! Engine Module
//!
//! The LSM orchestrator that coordinates the memtable and the tables.
//!
//! ## Responsibilities
//! - Route writes to the memtable
//! - Flush the memtable to a new generation once it grows past the threshold
//! - Merge-scan the memtable and every table into one sorted live view
//! - Flush leftovers and close tables on shutdown

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::memtable::MemTable;
use crate::storage::{LiveEntries, MergeIterator, StorageManager};
use crate::types::Table;

/// Sorted stream of live `(key, value)` pairs returned by scans
pub type Scan = LiveEntries<MergeIterator>;

/// Everything a read must see consistently
struct EngineState {
    /// Current mutable buffer
    memtable: MemTable,
    /// Installed tables by generation
    storage: StorageManager,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// Always on; `Config` has no switch for it. `Engine` is `Send + Sync`
/// and callers need no locking of their own.
///
/// - **Writes** (put/delete/flush/close): serialized by `write_lock`
///   - Only ONE write operation at a time
///   - A flush writes its table while holding only `write_lock`, then
///     swaps {new table, empty memtable} in under one `state` write lock
///
/// - **Reads** (scan/get/range): take a `state` read lock just long
///   enough to snapshot the memtable and clone the table handles
///   - A scan sees either the pre-flush or the post-flush state
///   - The returned iterator holds no lock
///
/// ## Poisoning
/// A failed flush leaves the triggering write in memory but not on disk.
/// The engine then refuses further writes, flushes and close with
/// `KvError::Poisoned`; scans keep working on the in-memory state.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Memtable + table set
    state: RwLock<EngineState>,

    /// Serializes write operations (put/delete/flush/close)
    write_lock: Mutex<()>,

    /// Set when a flush failed
    poisoned: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Create data directory if allowed
    /// 3. Load existing tables (next generation = max + 1)
    /// 4. Start with an empty memtable
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        if config.create_if_missing {
            fs::create_dir_all(&config.data_dir)?;
        }

        let storage = StorageManager::open(&config.data_dir)?;

        Ok(Self {
            config,
            state: RwLock::new(EngineState {
                memtable: MemTable::new(),
                storage,
            }),
            write_lock: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        })
    }

    /// Open with a path and flush threshold (convenience method)
    ///
    /// Uses default config otherwise
    pub fn open_path(path: &Path, flush_threshold: usize) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .flush_threshold(flush_threshold)
            .build();
        Self::open(config)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to MemTable
    /// 3. Flush if the estimate is now above the threshold
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_healthy()?;

        let new_size = self.state.write().memtable.upsert(key, value);

        if new_size > self.config.flush_threshold {
            self.flush_internal()?;
        }

        Ok(())
    }

    /// Delete a key
    ///
    /// Same steps as `put`, with a tombstone instead of a value
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_healthy()?;

        let new_size = self.state.write().memtable.remove(key);

        if new_size > self.config.flush_threshold {
            self.flush_internal()?;
        }

        Ok(())
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size; no-op when empty
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.ensure_healthy()?;

        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        // Step 1: Snapshot the memtable and pick the generation
        let (generation, snapshot, entries) = {
            let state = self.state.read();
            if state.memtable.is_empty() {
                return Ok(());
            }
            (
                state.storage.next_generation(),
                state.memtable.iter_from(&[]),
                state.memtable.entry_count(),
            )
        };

        // Step 2: Serialize + rename without blocking readers
        let table = match StorageManager::write_table(
            &self.config.data_dir,
            generation,
            snapshot,
            self.config.sync_on_flush,
        ) {
            Ok(table) => table,
            Err(e) => return Err(self.poison(generation, e)),
        };

        // Step 3: Swap in the table and a fresh memtable together
        {
            let mut state = self.state.write();
            if let Err(e) = state.storage.install(generation, table) {
                return Err(self.poison(generation, e));
            }
            state.memtable = MemTable::new();
        }

        tracing::info!(generation, entries, "memtable flushed");
        Ok(())
    }

    /// Mark the engine unusable after a failed flush
    fn poison(&self, generation: u64, error: KvError) -> KvError {
        tracing::error!(generation, error = %error, "flush failed, engine poisoned");
        self.poisoned.store(true, Ordering::SeqCst);
        error
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(KvError::Poisoned);
        }
        Ok(())
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Scan live entries with key >= `from`, ascending
    ///
    /// Sources: memtable first, then tables newest → oldest. For each key
    /// only the most recent value survives; tombstoned keys are skipped.
    pub fn scan(&self, from: &[u8]) -> Result<Scan> {
        let sources = {
            let state = self.state.read();
            let mut sources = Vec::with_capacity(state.storage.table_count() + 1);
            sources.push(state.memtable.scan_from(from)?);
            sources.extend(state.storage.scan_sources(from)?);
            sources
        };

        Ok(LiveEntries::new(MergeIterator::new(sources)?))
    }

    /// Get a live value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.scan(key)?.next().transpose()? {
            Some((found, value)) if found.as_ref() == key => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Live entries with `from <= key < to`
    pub fn range(&self, from: &[u8], to: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let mut out = Vec::new();
        for entry in self.scan(from)? {
            let (key, value) = entry?;
            if key.as_ref() >= to {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Flushes a non-empty memtable, then closes tables oldest first
    pub fn close(self) -> Result<()> {
        self.flush()?;

        let state = self.state.into_inner();
        state.storage.close();

        tracing::info!(dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the current memtable size estimate
    pub fn memtable_size(&self) -> usize {
        self.state.read().memtable.size_in_bytes()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.state.read().memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.state.read().storage.table_count()
    }

    /// Generations of the installed tables, ascending
    pub fn generations(&self) -> Vec<u64> {
        self.state.read().storage.generations()
    }

    /// Generation the next flush will write
    pub fn next_generation(&self) -> u64 {
        self.state.read().storage.next_generation()
    }

    /// Whether a failed flush has poisoned this engine
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
