//! SSTable Builder
//!
//! Writes sorted cells to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::types::Cell;
use crate::KvError;

use super::{FLAG_LIVE, FLAG_TOMBSTONE, ROW_FIXED_SIZE, U32_SIZE};

/// What a finished build produced
#[derive(Debug, Clone)]
pub struct TableSummary {
    /// Path the rows were written to
    pub path: PathBuf,
    /// Number of rows
    pub row_count: u32,
    /// Final file size in bytes
    pub file_size: u64,
}

/// Builder for creating new SSTables from sorted cells
///
/// Performs no recovery: on error the caller discards the partial file.
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Offset of every row written so far
    offsets: Vec<u32>,
    /// Current write position (start of the next row)
    current_offset: u64,
    /// Last key written, to catch unsorted input
    last_key: Option<Bytes>,
    /// Scratch buffer reused for row encoding
    scratch: BytesMut,
    /// fsync the file in `finish()`
    sync: bool,
}

impl SSTableBuilder {
    /// Create a new SSTable builder, truncating any file at `path`
    ///
    /// Call `add()` in strictly ascending key order, then `finish()`.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offsets: Vec::new(),
            current_offset: 0,
            last_key: None,
            scratch: BytesMut::new(),
            sync: true,
        })
    }

    /// Whether `finish()` fsyncs the file (default: true)
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Append one row
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        if let Some(last) = &self.last_key {
            if cell.key <= *last {
                return Err(KvError::Storage(format!(
                    "SSTable keys must be strictly ascending: {:?} after {:?}",
                    cell.key, last
                )));
            }
        }

        let offset = u32::try_from(self.current_offset).map_err(|_| {
            KvError::Storage(format!(
                "SSTable data region exceeds 4 GiB at row {}",
                self.offsets.len()
            ))
        })?;

        self.scratch.clear();
        encode_row(&mut self.scratch, cell)?;
        self.writer.write_all(&self.scratch)?;

        self.offsets.push(offset);
        self.current_offset += self.scratch.len() as u64;
        self.last_key = Some(cell.key.clone());

        Ok(())
    }

    /// Number of rows added so far
    pub fn row_count(&self) -> usize {
        self.offsets.len()
    }

    /// Finish building: write offset array and row count, flush and close
    pub fn finish(mut self) -> Result<TableSummary> {
        let row_count = u32::try_from(self.offsets.len()).map_err(|_| {
            KvError::Storage(format!("too many rows for one SSTable: {}", self.offsets.len()))
        })?;

        let mut trailer = BytesMut::with_capacity((self.offsets.len() + 1) * U32_SIZE as usize);
        for offset in &self.offsets {
            trailer.put_u32(*offset);
        }
        trailer.put_u32(row_count);
        self.writer.write_all(&trailer)?;

        self.writer.flush()?;

        let file = self.writer.into_inner().map_err(|e| {
            KvError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        if self.sync {
            file.sync_all()?;
        }

        let file_size = file.metadata()?.len();

        Ok(TableSummary {
            path: self.path,
            row_count,
            file_size,
        })
    }
}

/// Write every cell of an already sorted, deduplicated stream to `path`
pub fn serialize<I>(path: &Path, cells: I, sync: bool) -> Result<TableSummary>
where
    I: IntoIterator<Item = Cell>,
{
    let mut builder = SSTableBuilder::new(path)?.sync(sync);
    for cell in cells {
        builder.add(&cell)?;
    }
    builder.finish()
}

/// Encode one row: [KeyLen][Key][Timestamp][Flag]([ValLen][Value])?
fn encode_row(buf: &mut BytesMut, cell: &Cell) -> Result<()> {
    let key_len = u32::try_from(cell.key.len())
        .map_err(|_| KvError::Storage(format!("key too large: {} bytes", cell.key.len())))?;

    buf.reserve(ROW_FIXED_SIZE as usize + cell.key.len());
    buf.put_u32(key_len);
    buf.put_slice(&cell.key);
    buf.put_u64(cell.value.timestamp());

    match cell.value.payload() {
        None => buf.put_u8(FLAG_TOMBSTONE),
        Some(payload) => {
            let val_len = u32::try_from(payload.len()).map_err(|_| {
                KvError::Storage(format!("value too large: {} bytes", payload.len()))
            })?;
            buf.put_u8(FLAG_LIVE);
            buf.put_u32(val_len);
            buf.put_slice(payload);
        }
    }

    Ok(())
}
