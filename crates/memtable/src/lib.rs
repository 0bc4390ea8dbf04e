//! # Memtable - LevelKV write buffer
//!
//! The entry model shared by every layer of the engine ([`TableEntry`]), the
//! logical clock that stamps writes ([`LogicalClock`]), the [`Table`] trait
//! implemented by every scannable source, and the concurrent in-memory
//! [`MemTable`] itself.
//!
//! ```text
//!  upsert / remove ──► SkipMap<key, TableEntry> ──► iter_from(key) ──► merge
//!                        (one entry per key)
//! ```

mod clock;
mod entry;
mod table;

pub use clock::LogicalClock;
pub use entry::{TableEntry, LEN_BYTES, TS_BYTES};
pub use table::{until, EntryIter, Table};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Concurrent, ordered write buffer holding at most one entry per key.
///
/// Inserts never block each other. A write replaces the current entry for its
/// key unless that entry carries a newer timestamp. The byte counter grows by
/// the encoded size of every accepted write and is never decremented; it
/// measures how much has been written into this buffer, which is what the
/// flush threshold is compared against.
#[derive(Debug, Default)]
pub struct MemTable {
    map: Arc<SkipMap<Bytes, TableEntry>>,
    size: AtomicU64,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, key: impl Into<Bytes>, value: impl Into<Bytes>, ts: i64) {
        self.put(TableEntry::upsert(key, value, ts));
    }

    /// Writes a tombstone for `key`.
    pub fn remove(&self, key: impl Into<Bytes>, ts: i64) {
        self.put(TableEntry::tombstone(key, ts));
    }

    fn put(&self, entry: TableEntry) {
        let ts = entry.ts();
        let size = entry.encoded_size() as u64;
        let stored = self
            .map
            .compare_insert(entry.key().clone(), entry, |old| old.ts() <= ts);
        if stored.value().ts() == ts {
            self.size.fetch_add(size, Ordering::Relaxed);
        }
    }

    /// Latest entry for `key`, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<TableEntry> {
        self.map.get(key).map(|e| e.value().clone())
    }
}

impl Table for MemTable {
    fn size_in_bytes(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    fn count(&self) -> usize {
        self.map.len()
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        Box::new(MemTableIter {
            map: Arc::clone(&self.map),
            next_from: Bound::Included(Bytes::copy_from_slice(from)),
        })
    }
}

/// Weakly consistent cursor over a [`MemTable`].
///
/// Holds a handle to the map plus the last key returned, and re-seeks past
/// it on every step, so it never borrows the map and observes concurrent
/// inserts that land ahead of the cursor.
pub struct MemTableIter {
    map: Arc<SkipMap<Bytes, TableEntry>>,
    next_from: Bound<Bytes>,
}

impl Iterator for MemTableIter {
    type Item = TableEntry;

    fn next(&mut self) -> Option<TableEntry> {
        let (key, entry) = {
            let found = self
                .map
                .range((self.next_from.clone(), Bound::Unbounded))
                .next()?;
            (found.key().clone(), found.value().clone())
        };
        self.next_from = Bound::Excluded(key);
        Some(entry)
    }
}

#[cfg(test)]
mod tests;
