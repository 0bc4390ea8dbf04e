//! Merge-read primitives shared by every read and compaction path.
//!
//! [`MergeIterator`] interleaves already-sorted sources into one stream in
//! entry order. [`Collapse`] then keeps only the first (newest) version of
//! each key, and [`alive`] drops tombstones for public reads. Compaction
//! uses the collapsed stream directly so tombstones can be carried down a
//! level or garbage-collected at the bottom.

use memtable::{EntryIter, TableEntry};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::iter::Peekable;

/// The head entry of one source, ordered for the merge heap.
struct HeapEntry {
    entry: TableEntry,
    /// Index into the `sources` array.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* entry first, so
        // reverse the entry order. On tie, prefer the lower source index.
        other
            .entry
            .order(&self.entry)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// K-way merge of sorted entry streams.
///
/// Sources are listed newest first: when two sources hold the same key with
/// the same timestamp, the one with the lower index is yielded first.
pub struct MergeIterator {
    sources: Vec<EntryIter>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    pub fn new(mut sources: Vec<EntryIter>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(entry) = iter.next() {
                heap.push(HeapEntry { entry, source });
            }
        }
        Self { sources, heap }
    }
}

impl Iterator for MergeIterator {
    type Item = TableEntry;

    fn next(&mut self) -> Option<TableEntry> {
        let top = self.heap.pop()?;
        if let Some(entry) = self.sources[top.source].next() {
            self.heap.push(HeapEntry {
                entry,
                source: top.source,
            });
        }
        Some(top.entry)
    }
}

/// Keeps the first entry of every run of equal keys.
pub struct Collapse<I: Iterator<Item = TableEntry>> {
    inner: Peekable<I>,
}

impl<I: Iterator<Item = TableEntry>> Collapse<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner: inner.peekable(),
        }
    }
}

impl<I: Iterator<Item = TableEntry>> Iterator for Collapse<I> {
    type Item = TableEntry;

    fn next(&mut self) -> Option<TableEntry> {
        let first = self.inner.next()?;
        while self
            .inner
            .next_if(|e| e.key() == first.key())
            .is_some()
        {}
        Some(first)
    }
}

/// Merges `sources` (newest first) and collapses each key to its newest
/// version. Tombstones are kept.
pub fn collapse(sources: Vec<EntryIter>) -> Collapse<MergeIterator> {
    Collapse::new(MergeIterator::new(sources))
}

/// Same as [`collapse`], boxed for use as a [`memtable::Table`] iterator.
pub fn collapse_boxed(sources: Vec<EntryIter>) -> EntryIter {
    Box::new(collapse(sources))
}

/// Drops tombstones.
pub fn alive<I>(iter: I) -> impl Iterator<Item = TableEntry>
where
    I: Iterator<Item = TableEntry>,
{
    iter.filter(|e| !e.is_tombstone())
}
