//! Storage Manager
//!
//! Manages the generation-ordered set of SSTables in one directory.
//!
//! ## Responsibilities
//! - Discover existing `<generation>.dat` files on startup
//! - Write new tables to `<generation>.tmp` and rename them into place
//! - Hand out per-table scans, newest generation first
//! - Close tables oldest → newest on shutdown

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{Cell, CellIter, Table};
use crate::KvError;

use super::sstable::{self, SSTable};

/// Suffix of installed table files
pub const TABLE_SUFFIX: &str = ".dat";

/// Suffix of tables still being written
pub const TEMP_SUFFIX: &str = ".tmp";

/// Manages the storage layer
///
/// ## Concurrency:
/// - No interior locking; the engine keeps this inside its state lock
/// - `write_table` only touches the filesystem, so a flush can write its
///   table while readers still use the old state
pub struct StorageManager {
    /// Open tables keyed by generation (ascending)
    tables: BTreeMap<u64, SSTable>,

    /// Generation the next flush will use
    next_generation: u64,
}

impl StorageManager {
    /// Open the tables found in `path`
    ///
    /// On startup:
    /// 1. List the directory
    /// 2. Parse every `<n>.dat` name (anything else is ignored)
    /// 3. Open each table, validating its layout; a generation may
    ///    appear only once
    /// 4. Next generation = max + 1, or 0 if there are no tables
    pub fn open(path: &Path) -> Result<Self> {
        let mut tables = BTreeMap::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.ends_with(TEMP_SUFFIX) {
                tracing::warn!(file = %name, "ignoring leftover temp table from an interrupted flush");
                continue;
            }

            let Some(generation) = Self::parse_generation(&name)? else {
                continue;
            };

            if tables.contains_key(&generation) {
                return Err(KvError::format(format!(
                    "table file name {:?} repeats generation {}",
                    name, generation
                )));
            }

            let table = SSTable::open(&file_path)?;
            tracing::debug!(generation, rows = table.row_count(), "loaded sstable");
            tables.insert(generation, table);
        }

        let next_generation = tables
            .keys()
            .next_back()
            .map_or(0, |&generation| generation + 1);

        tracing::info!(
            dir = %path.display(),
            tables = tables.len(),
            next_generation,
            "storage opened"
        );

        Ok(Self {
            tables,
            next_generation,
        })
    }

    /// Write `cells` as the table for `generation` and rename it into place
    ///
    /// The rows go to `<generation>.tmp` first; only a complete file is
    /// renamed to `<generation>.dat`. On failure the temp file is removed
    /// on a best-effort basis and the error is returned.
    pub fn write_table<I>(dir: &Path, generation: u64, cells: I, sync: bool) -> Result<SSTable>
    where
        I: IntoIterator<Item = Cell>,
    {
        let temp_path = Self::temp_path_with_dir(dir, generation);
        let final_path = Self::table_path_with_dir(dir, generation);

        let result = sstable::serialize(&temp_path, cells, sync).and_then(|summary| {
            fs::rename(&temp_path, &final_path)?;
            if sync {
                Self::sync_dir(dir)?;
            }
            Ok(summary)
        });

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    tracing::debug!(path = %temp_path.display(), error = %cleanup, "temp table not removed");
                }
                return Err(e);
            }
        };

        tracing::debug!(
            generation,
            rows = summary.row_count,
            bytes = summary.file_size,
            "sstable written"
        );

        SSTable::open(&final_path)
    }

    /// Register a freshly written table
    ///
    /// Generations must be new and increasing; the counter moves past it.
    pub fn install(&mut self, generation: u64, table: SSTable) -> Result<()> {
        if generation < self.next_generation {
            return Err(KvError::Storage(format!(
                "generation {} already used (next is {})",
                generation, self.next_generation
            )));
        }

        self.tables.insert(generation, table);
        self.next_generation = generation + 1;
        Ok(())
    }

    /// One scan per table starting at `from`, newest generation first
    pub fn scan_sources(&self, from: &[u8]) -> Result<Vec<CellIter>> {
        self.tables
            .values()
            .rev()
            .map(|table| table.scan_from(from))
            .collect()
    }

    /// Close every table, oldest generation first
    pub fn close(self) {
        for (generation, table) in self.tables {
            tracing::trace!(generation, "closing table");
            table.close();
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the number of SSTables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Generations currently registered, ascending
    pub fn generations(&self) -> Vec<u64> {
        self.tables.keys().copied().collect()
    }

    /// Table registered under `generation`
    pub fn table(&self, generation: u64) -> Option<&SSTable> {
        self.tables.get(&generation)
    }

    /// Generation the next flush will use
    pub fn next_generation(&self) -> u64 {
        self.next_generation
    }

    // =========================================================================
    // Naming Helpers
    // =========================================================================

    /// "<dir>/<generation>.dat"
    pub fn table_path_with_dir(dir: &Path, generation: u64) -> PathBuf {
        dir.join(format!("{}{}", generation, TABLE_SUFFIX))
    }

    /// "<dir>/<generation>.tmp"
    pub fn temp_path_with_dir(dir: &Path, generation: u64) -> PathBuf {
        dir.join(format!("{}{}", generation, TEMP_SUFFIX))
    }

    /// Parse the generation from a file name
    ///
    /// "42.dat" → Ok(Some(42)); "notes.txt" → Ok(None);
    /// "x.dat", "007.dat", "+1.dat" → Err(Format)
    ///
    /// Only the canonical decimal form is accepted, so every generation
    /// has exactly one file name.
    pub fn parse_generation(name: &str) -> Result<Option<u64>> {
        let Some(stem) = name.strip_suffix(TABLE_SUFFIX) else {
            return Ok(None);
        };

        match stem.parse::<u64>() {
            Ok(generation) if stem == generation.to_string() => Ok(Some(generation)),
            _ => Err(KvError::format(format!(
                "table file name {:?} is not <generation>{}",
                name, TABLE_SUFFIX
            ))),
        }
    }

    /// Persist the rename itself
    #[cfg(unix)]
    fn sync_dir(dir: &Path) -> Result<()> {
        fs::File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(_dir: &Path) -> Result<()> {
        Ok(())
    }
}
