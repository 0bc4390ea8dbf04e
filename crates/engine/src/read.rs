use bytes::Bytes;
use memtable::{EntryIter, Table, TableEntry};
use sstable::{alive, collapse_boxed};

use crate::Engine;

impl Engine {
    /// Merged entries starting at `from`, tombstones included.
    ///
    /// Memtables and tables are snapshotted together, so a flush finishing
    /// mid-call is seen either as a buffer or as a table, never both or
    /// neither.
    pub fn entry_iter(&self, from: &[u8]) -> EntryIter {
        self.entries(from, None)
    }

    fn entries(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        let sources = {
            let _guard = self.shared.lock.read();
            vec![
                self.shared.memtables.range(from, to),
                self.shared.tables.range(from, to),
            ]
        };
        collapse_boxed(sources)
    }

    /// The newest entry for `key`, which may be a tombstone.
    pub fn get_entry(&self, key: &[u8]) -> Option<TableEntry> {
        self.entry_iter(key)
            .next()
            .filter(|entry| entry.key().as_ref() == key)
    }

    /// Returns the live value for `key`, or `None` if it was never written
    /// or was removed.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_entry(key)
            .and_then(TableEntry::into_live)
            .map(|(_, value)| value)
    }

    /// Live pairs with keys `>= from`, ascending.
    pub fn iter(&self, from: &[u8]) -> impl Iterator<Item = (Bytes, Bytes)> {
        alive(self.entries(from, None)).filter_map(TableEntry::into_live)
    }

    /// Live pairs with `from <= key < to`, ascending.
    pub fn range(&self, from: &[u8], to: &[u8]) -> impl Iterator<Item = (Bytes, Bytes)> {
        alive(self.entries(from, Some(to))).filter_map(TableEntry::into_live)
    }
}
