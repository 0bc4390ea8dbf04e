use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use memmap2::Mmap;
use memtable::{EntryIter, Table, TableEntry};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::format::{check_entry, entry_layout, read_trailer, SsTableError, OFFSET_BYTES};

/// Immutable, memory-mapped view over a finalized table file.
///
/// The whole file is mapped once on [`open`](SsTable::open) and wrapped in a
/// reference-counted [`Bytes`]; keys and values handed out are zero-copy
/// slices of that mapping and keep it alive on their own. Cloning an
/// `SsTable` is cheap and shares the mapping.
///
/// Every offset and entry boundary is validated at open time, so lookups
/// and scans afterwards cannot fail.
#[derive(Clone)]
pub struct SsTable {
    path: Arc<Path>,
    data: Bytes,
    count: usize,
    offsets_start: usize,
}

impl fmt::Debug for SsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsTable")
            .field("path", &self.path)
            .field("size", &self.data.len())
            .field("count", &self.count)
            .finish()
    }
}

impl SsTable {
    /// Maps the file at `path` and validates its layout.
    ///
    /// # Validation
    ///
    /// - The file is at least 8 bytes and ends with the magic.
    /// - The entry count is positive and the offset table fits before the
    ///   trailer.
    /// - Offsets ascend strictly and each one points at a complete entry
    ///   inside the entry region.
    ///
    /// # Errors
    ///
    /// [`SsTableError::Corrupt`] for any layout violation, or an I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SsTableError> {
        let path = path.as_ref();
        let corrupt = |reason: String| SsTableError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path)?;
        if file.metadata()?.len() < 8 {
            return Err(corrupt("file too small".to_string()));
        }
        // SAFETY: table files are never modified after the rename that
        // publishes them; they are only ever deleted.
        let mmap = unsafe { Mmap::map(&file)? };
        let data = Bytes::from_owner(mmap);

        let (count, offsets_start) = read_trailer(&data).map_err(corrupt)?;

        let mut previous: Option<usize> = None;
        for i in 0..count {
            let offset = read_offset(&data, offsets_start, i);
            if previous.is_some_and(|p| offset <= p) {
                return Err(corrupt(format!("offset #{} is not ascending", i)));
            }
            let limit = if i + 1 < count {
                read_offset(&data, offsets_start, i + 1).min(offsets_start)
            } else {
                offsets_start
            };
            if offset >= limit || check_entry(&data, offset, limit).is_none() {
                return Err(corrupt(format!("entry #{} at offset {} is truncated", i, offset)));
            }
            previous = Some(offset);
        }

        Ok(Self {
            path: Arc::from(path),
            data,
            count,
            offsets_start,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Smallest key in the table.
    #[must_use]
    pub fn lowest(&self) -> Bytes {
        self.key_bytes(0)
    }

    /// Largest key in the table.
    #[must_use]
    pub fn highest(&self) -> Bytes {
        self.key_bytes(self.count - 1)
    }

    /// Index of `key`, or of the first key greater than it (`count` when
    /// every key is smaller).
    #[must_use]
    pub fn search(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Point lookup. The returned entry may be a tombstone.
    pub fn get(&self, key: &[u8]) -> Option<TableEntry> {
        let idx = self.search(key);
        (idx < self.count && self.key_at(idx) == key).then(|| self.entry_at(idx))
    }

    /// Entry at position `idx` (`idx < count`).
    pub fn entry_at(&self, idx: usize) -> TableEntry {
        let layout = entry_layout(&self.data, self.offset(idx));
        let key = self.data.slice(layout.key_start..layout.key_end);
        match layout.value {
            Some((start, end)) => TableEntry::upsert(key, self.data.slice(start..end), layout.ts),
            None => TableEntry::tombstone(key, layout.ts),
        }
    }

    fn offset(&self, idx: usize) -> usize {
        read_offset(&self.data, self.offsets_start, idx)
    }

    fn key_at(&self, idx: usize) -> &[u8] {
        let layout = entry_layout(&self.data, self.offset(idx));
        &self.data[layout.key_start..layout.key_end]
    }

    fn key_bytes(&self, idx: usize) -> Bytes {
        let layout = entry_layout(&self.data, self.offset(idx));
        self.data.slice(layout.key_start..layout.key_end)
    }
}

fn read_offset(data: &[u8], offsets_start: usize, idx: usize) -> usize {
    let at = offsets_start + idx * OFFSET_BYTES;
    BigEndian::read_u32(&data[at..at + OFFSET_BYTES]) as usize
}

impl Table for SsTable {
    fn size_in_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn count(&self) -> usize {
        self.count
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        let pos = self.search(from);
        Box::new(SsTableIter {
            table: self.clone(),
            pos,
        })
    }
}

/// Forward cursor over an [`SsTable`].
pub struct SsTableIter {
    table: SsTable,
    pos: usize,
}

impl Iterator for SsTableIter {
    type Item = TableEntry;

    fn next(&mut self) -> Option<TableEntry> {
        if self.pos >= self.table.count {
            return None;
        }
        let entry = self.table.entry_at(self.pos);
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.table.count.saturating_sub(self.pos);
        (left, Some(left))
    }
}
