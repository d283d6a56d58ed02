//! Merge-Scan
//!
//! K-way merge of per-source cell streams into the engine's read view.
//!
//! ```text
//!   memtable ─┐
//!   gen N    ─┼─► MergeIterator ─► LiveEntries ─► (key, value)
//!   gen N-1  ─┤   (key ASC,        (first cell per key,
//!   ...      ─┘    newest first)    tombstones dropped)
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;

use crate::error::{KvError, Result};
use crate::types::{Cell, CellIter};

/// Heap slot: the current head of one source
struct HeapEntry {
    cell: Cell,
    /// Index into the source list; lower = higher priority (newer source)
    source_idx: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so smallest key / newest value / newest source pops first
        self.cell
            .cmp_merge(&other.cell)
            .then_with(|| self.source_idx.cmp(&other.source_idx))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Merges sorted sources into one stream ordered by `Cell::cmp_merge`.
///
/// Sources are given newest first (memtable, then tables by descending
/// generation); equal timestamps fall back to that order. Every cell of
/// every source is yielded, duplicates included.
pub struct MergeIterator {
    sources: Vec<CellIter>,
    heap: BinaryHeap<HeapEntry>,
    /// Refill error to report after the cell already popped
    pending_error: Option<KvError>,
    /// Set once a source fails; nothing is yielded afterwards
    failed: bool,
}

impl MergeIterator {
    /// Prime the heap with the first cell of each source
    pub fn new(mut sources: Vec<CellIter>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());

        for (idx, source) in sources.iter_mut().enumerate() {
            if let Some(cell) = source.next().transpose()? {
                heap.push(HeapEntry {
                    cell,
                    source_idx: idx,
                });
            }
        }

        Ok(Self {
            sources,
            heap,
            pending_error: None,
            failed: false,
        })
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            self.failed = true;
            return Some(Err(e));
        }

        let entry = self.heap.pop()?;

        // Refill from the source that produced this cell
        match self.sources[entry.source_idx].next() {
            Some(Ok(cell)) => self.heap.push(HeapEntry {
                cell,
                source_idx: entry.source_idx,
            }),
            Some(Err(e)) => self.pending_error = Some(e),
            None => {}
        }

        Some(Ok(entry.cell))
    }
}

/// Collapses runs of equal keys to their first (most recent) cell and
/// drops tombstones, leaving `(key, payload)` pairs in key order.
pub struct LiveEntries<I> {
    inner: I,
    /// Key of the last cell that won its run
    last_key: Option<Bytes>,
}

impl<I> LiveEntries<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            last_key: None,
        }
    }
}

impl<I> Iterator for LiveEntries<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cell = match self.inner.next()? {
                Ok(cell) => cell,
                Err(e) => return Some(Err(e)),
            };

            // Older version of a key already decided
            if self.last_key.as_ref() == Some(&cell.key) {
                continue;
            }
            self.last_key = Some(cell.key.clone());

            if let Some(payload) = cell.value.into_payload() {
                return Some(Ok((cell.key, payload)));
            }
        }
    }
}
