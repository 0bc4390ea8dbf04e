use bytes::Bytes;

use crate::TableEntry;

/// Owned, sendable iterator over entries in entry order.
pub type EntryIter = Box<dyn Iterator<Item = TableEntry> + Send>;

/// Anything that can be scanned in key order and sized: a memtable, a single
/// on-disk table, a level, or a whole pool of tables.
pub trait Table: Send + Sync {
    /// Sum of the encoded sizes of the entries (file size for disk tables).
    fn size_in_bytes(&self) -> u64;

    /// Number of entries, tombstones included.
    fn count(&self) -> usize;

    /// Entries with `key >= from`, tombstones included.
    fn iter_from(&self, from: &[u8]) -> EntryIter;

    fn iter_all(&self) -> EntryIter {
        self.iter_from(&[])
    }

    /// Entries with `from <= key < to`, or `key >= from` when `to` is `None`.
    fn range(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        match to {
            None => self.iter_from(from),
            Some(to) => until(self.iter_from(from), to),
        }
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Cuts `iter` before the first entry whose key is `>= to`.
pub fn until(iter: EntryIter, to: &[u8]) -> EntryIter {
    let to = Bytes::copy_from_slice(to);
    Box::new(iter.take_while(move |e| e.key().as_ref() < to.as_ref()))
}
