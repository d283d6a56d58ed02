//! SSTable Reader
//!
//! Opens SSTable files and locates rows by binary search over the
//! offset array.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;

use crate::error::Result;
use crate::types::{Cell, CellIter, Table, Value};
use crate::KvError;

use super::iterator::SSTableIterator;
use super::{FLAG_LIVE, FLAG_TOMBSTONE, ROW_FIXED_SIZE, U32_SIZE};

/// Read-only handle to one SSTable file
///
/// Cloning is cheap and shares the file handle, so scans can keep reading
/// after the table set that produced them has moved on. There are no
/// mutating methods: a table never changes after it is written.
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path of the table file
    path: PathBuf,
    /// File handle, locked for each seek + read
    file: Arc<Mutex<File>>,
    /// Byte offset of every row, loaded at open
    offsets: Arc<[u32]>,
    /// Where the offset array begins
    data_region_size: u64,
    /// Total file size
    file_size: u64,
}

impl SSTable {
    /// Open an SSTable for reading
    ///
    /// Reads the row count from the last four bytes, then loads and
    /// validates the offset array. Inconsistent layouts are rejected here
    /// rather than on first read.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < U32_SIZE {
            return Err(KvError::format(format!(
                "{}: {} bytes is too short for a row count",
                path.display(),
                file_size
            )));
        }

        // Trailer: row count
        file.seek(SeekFrom::End(-(U32_SIZE as i64)))?;
        let mut trailer = [0u8; U32_SIZE as usize];
        file.read_exact(&mut trailer)?;
        let row_count = u32::from_be_bytes(trailer);

        let index_size = (u64::from(row_count) + 1) * U32_SIZE;
        if index_size > file_size {
            return Err(KvError::format(format!(
                "{}: row count {} needs {} index bytes but file has {}",
                path.display(),
                row_count,
                index_size,
                file_size
            )));
        }
        let data_region_size = file_size - index_size;

        // Offset array
        file.seek(SeekFrom::Start(data_region_size))?;
        let mut raw = vec![0u8; (index_size - U32_SIZE) as usize];
        file.read_exact(&mut raw)?;

        let mut buf = &raw[..];
        let mut offsets = Vec::with_capacity(row_count as usize);
        while buf.has_remaining() {
            offsets.push(buf.get_u32());
        }

        Self::validate_offsets(path, &offsets, data_region_size)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            offsets: offsets.into(),
            data_region_size,
            file_size,
        })
    }

    /// Every row must start inside the data region, in ascending order,
    /// with room for at least its fixed-size fields.
    fn validate_offsets(path: &Path, offsets: &[u32], data_region_size: u64) -> Result<()> {
        for (row, &offset) in offsets.iter().enumerate() {
            let start = u64::from(offset);
            let end = offsets
                .get(row + 1)
                .map_or(data_region_size, |&next| u64::from(next));

            if end > data_region_size || start + ROW_FIXED_SIZE > end {
                return Err(KvError::format(format!(
                    "{}: row {} spans {}..{} outside data region of {} bytes",
                    path.display(),
                    row,
                    start,
                    end,
                    data_region_size
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Row Access
    // =========================================================================

    /// Start of `row`; rows past the end are a storage error
    fn row_start(&self, row: usize) -> Result<u64> {
        self.offsets
            .get(row)
            .map(|&offset| u64::from(offset))
            .ok_or_else(|| {
                KvError::Storage(format!(
                    "{}: row {} out of range ({} rows)",
                    self.path.display(),
                    row,
                    self.offsets.len()
                ))
            })
    }

    /// End of `row`, i.e. start of the next row or of the offset array
    fn row_end(&self, row: usize) -> u64 {
        self.offsets
            .get(row + 1)
            .map_or(self.data_region_size, |&next| u64::from(next))
    }

    /// Read `len` bytes at `pos`
    fn read_at(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Key of `row` without reading the rest of it (binary search only)
    pub fn key_at(&self, row: usize) -> Result<Bytes> {
        let start = self.row_start(row)?;
        let end = self.row_end(row);

        let len_bytes = self.read_at(start, U32_SIZE as usize)?;
        let key_len = u64::from((&len_bytes[..]).get_u32());

        if start + U32_SIZE + key_len > end {
            return Err(KvError::format(format!(
                "{}: key of row {} ({} bytes) overruns the row",
                self.path.display(),
                row,
                key_len
            )));
        }

        Ok(Bytes::from(self.read_at(start + U32_SIZE, key_len as usize)?))
    }

    /// Read the full row as a cell
    pub fn row_at(&self, row: usize) -> Result<Cell> {
        let start = self.row_start(row)?;
        let end = self.row_end(row);
        let raw = Bytes::from(self.read_at(start, (end - start) as usize)?);

        decode_row(raw).map_err(|msg| {
            KvError::format(format!("{}: row {}: {}", self.path.display(), row, msg))
        })
    }

    /// Smallest row index whose key is >= `target`; `row_count()` if none
    pub fn find_first_row_with_key_gte(&self, target: &[u8]) -> Result<usize> {
        let mut low: i64 = 0;
        let mut high: i64 = self.offsets.len() as i64 - 1;

        while low <= high {
            let mid = low + (high - low) / 2;
            match self.key_at(mid as usize)?.as_ref().cmp(target) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid - 1,
                // Keys are unique within a table
                Ordering::Equal => return Ok(mid as usize),
            }
        }

        Ok(low as usize)
    }

    /// Lazy scan of every row with key >= `from`
    pub fn iter_from(&self, from: &[u8]) -> Result<SSTableIterator> {
        let start = self.find_first_row_with_key_gte(from)?;
        Ok(SSTableIterator::new(self.clone(), start))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes before the offset array
    pub fn data_region_size(&self) -> u64 {
        self.data_region_size
    }

    /// Release this handle
    ///
    /// The file closes once every clone held by running scans is gone too.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "closing sstable");
    }
}

impl Table for SSTable {
    fn scan_from(&self, from: &[u8]) -> Result<CellIter> {
        Ok(Box::new(self.iter_from(from)?))
    }

    fn entry_count(&self) -> usize {
        self.row_count()
    }
}

/// Decode one row, which must be consumed exactly
fn decode_row(mut raw: Bytes) -> std::result::Result<Cell, String> {
    let key_len = take_u32(&mut raw, "key length")? as usize;
    if raw.remaining() < key_len {
        return Err(format!("truncated key ({} bytes expected)", key_len));
    }
    let key = raw.split_to(key_len);

    if raw.remaining() < 9 {
        return Err("truncated timestamp or tombstone flag".to_string());
    }
    let timestamp = raw.get_u64();
    if timestamp == 0 {
        return Err("zero timestamp".to_string());
    }

    let value = match raw.get_u8() {
        FLAG_TOMBSTONE => Value::tombstone(timestamp),
        FLAG_LIVE => {
            let val_len = take_u32(&mut raw, "value length")? as usize;
            if raw.remaining() < val_len {
                return Err(format!("truncated value ({} bytes expected)", val_len));
            }
            Value::live(timestamp, raw.split_to(val_len))
        }
        other => return Err(format!("unknown tombstone flag {}", other)),
    };

    if raw.has_remaining() {
        return Err(format!("{} trailing bytes", raw.remaining()));
    }

    Ok(Cell::new(key, value))
}

fn take_u32(raw: &mut Bytes, what: &str) -> std::result::Result<u32, String> {
    if raw.remaining() < 4 {
        return Err(format!("truncated {}", what));
    }
    Ok(raw.get_u32())
}
