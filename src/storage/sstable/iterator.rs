//! SSTable Iterator
//!
//! Sequential iteration over rows, starting from a binary-searched position.

use crate::error::Result;
use crate::types::Cell;

use super::SSTable;

/// Iterator over SSTable rows in sorted key order
///
/// Holds its own handle to the table, so it is `'static` and `Send`.
pub struct SSTableIterator {
    table: SSTable,
    /// Next row to read
    pos: usize,
    /// Set after a read error; the iterator is fused from then on
    failed: bool,
}

impl SSTableIterator {
    /// Create a new iterator starting at row `start`
    pub(super) fn new(table: SSTable, start: usize) -> Self {
        Self {
            table,
            pos: start,
            failed: false,
        }
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.table.row_count() {
            return None;
        }

        let row = self.table.row_at(self.pos);
        match row {
            Ok(_) => self.pos += 1,
            Err(_) => self.failed = true,
        }
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let left = self.table.row_count().saturating_sub(self.pos);
        (0, Some(left))
    }
}
