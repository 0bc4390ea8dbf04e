use bytes::Bytes;
use memtable::{Table, TableEntry};
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::format::{write_entry, write_trailer, SsTableError};
use crate::SsTable;

/// Writes a sorted stream of entries to disk as an immutable table file.
///
/// The writer is stateless. The write is crash-safe: data goes to a temporary
/// file first, is fsynced, and is then atomically renamed to its final name,
/// so a crash mid-write never leaves a partial table under a final name.
pub struct SsTableWriter {}

impl SsTableWriter {
    /// Streams `entries` into `tmp_path`, publishes the file as `path` and
    /// opens it.
    ///
    /// Entries must arrive in strictly ascending key order (one version per
    /// key). Memory use is bounded by the offset table, not by the data.
    ///
    /// # Errors
    ///
    /// [`SsTableError::Empty`] if `entries` yields nothing,
    /// [`SsTableError::Unordered`] on a key that does not ascend, or any I/O
    /// failure. On error the temporary file is removed.
    pub fn write_entries<I>(tmp_path: &Path, path: &Path, entries: I) -> Result<SsTable, SsTableError>
    where
        I: IntoIterator<Item = TableEntry>,
    {
        if let Err(e) = Self::write_tmp(tmp_path, entries) {
            let _ = std::fs::remove_file(tmp_path);
            return Err(e);
        }

        // Atomically move into place
        rename(tmp_path, path)?;

        // Fsync the parent directory so the rename itself survives a crash.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let table = SsTable::open(path)?;
        debug!(path = %path.display(), bytes = table.size_in_bytes(), "sstable written");
        Ok(table)
    }

    fn write_tmp<I>(tmp_path: &Path, entries: I) -> Result<(), SsTableError>
    where
        I: IntoIterator<Item = TableEntry>,
    {
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut offsets: Vec<u32> = Vec::new();
        let mut position: u64 = 0;
        let mut previous: Option<Bytes> = None;

        for entry in entries {
            if previous.as_ref().is_some_and(|p| p >= entry.key()) {
                return Err(SsTableError::Unordered(entry.key().to_vec()));
            }
            // The sign of the stored timestamp marks tombstones, so a
            // tombstone at 0 or a live entry below 0 would read back wrong.
            let encodable = if entry.is_tombstone() {
                entry.ts() > 0
            } else {
                entry.ts() >= 0
            };
            if !encodable {
                return Err(SsTableError::BadTimestamp {
                    key: entry.key().to_vec(),
                    ts: entry.ts(),
                });
            }
            let offset = u32::try_from(position).map_err(|_| SsTableError::TooLarge)?;
            write_entry(&mut file, &entry)?;
            offsets.push(offset);
            position += entry.encoded_size() as u64;
            previous = Some(entry.key().clone());
        }

        if offsets.is_empty() {
            return Err(SsTableError::Empty);
        }
        u32::try_from(position).map_err(|_| SsTableError::TooLarge)?;

        write_trailer(&mut file, &offsets)?;

        // Flush BufWriter, then sync the underlying file
        file.flush()?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }
}
