//! Table file format: entry encoding, trailer, and validation helpers.
//!
//! ```text
//! entry      = key_len (u32) | key | ts (i64) | [ val_len (u32) | val ]
//! file       = entry* | offset (u32) * count | count (u32) | magic (u32)
//! ```
//!
//! All integers are big-endian. A tombstone stores `-ts` in the timestamp
//! field and has no value section; a live entry stores `ts` (always > 0).
//! Offsets are relative to the start of the file and ascend in entry order.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memtable::{TableEntry, LEN_BYTES, TS_BYTES};
use std::io::{self, Write};
use std::path::PathBuf;

/// Magic number stored in the last four bytes of every table file.
pub const SSTABLE_MAGIC: u32 = 0xCAFE_FEED;

/// Size of one slot in the offset table.
pub const OFFSET_BYTES: usize = 4;

/// Size of the trailer: entry count (`u32`) + magic (`u32`).
pub const TRAILER_BYTES: usize = 4 + 4;

/// Errors produced while reading or writing table files.
#[derive(Debug, thiserror::Error)]
pub enum SsTableError {
    #[error("corrupt sstable {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("refusing to write an empty sstable")]
    Empty,
    #[error("entries out of order at key {0:?}")]
    Unordered(Vec<u8>),
    #[error("timestamp {ts} of key {key:?} cannot be encoded")]
    BadTimestamp { key: Vec<u8>, ts: i64 },
    #[error("sstable data exceeds the u32 offset range")]
    TooLarge,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes one entry in table encoding.
pub fn write_entry<W: Write>(w: &mut W, entry: &TableEntry) -> io::Result<()> {
    w.write_u32::<BigEndian>(entry.key().len() as u32)?;
    w.write_all(entry.key())?;
    match entry.value() {
        Some(value) => {
            w.write_i64::<BigEndian>(entry.ts())?;
            w.write_u32::<BigEndian>(value.len() as u32)?;
            w.write_all(value)?;
        }
        None => w.write_i64::<BigEndian>(-entry.ts())?,
    }
    Ok(())
}

/// Writes the offset table, the entry count and the magic.
pub fn write_trailer<W: Write>(w: &mut W, offsets: &[u32]) -> io::Result<()> {
    for offset in offsets {
        w.write_u32::<BigEndian>(*offset)?;
    }
    w.write_u32::<BigEndian>(offsets.len() as u32)?;
    w.write_u32::<BigEndian>(SSTABLE_MAGIC)?;
    Ok(())
}

/// Decodes the trailer of a whole-file buffer, returning
/// `(entry_count, offsets_start)`.
pub(crate) fn read_trailer(buf: &[u8]) -> Result<(usize, usize), String> {
    let len = buf.len();
    if len < TRAILER_BYTES {
        return Err(format!("file too small ({} bytes)", len));
    }
    let magic = BigEndian::read_u32(&buf[len - 4..]);
    if magic != SSTABLE_MAGIC {
        return Err(format!("bad magic {:#010x}", magic));
    }
    let count = BigEndian::read_u32(&buf[len - 8..len - 4]) as usize;
    if count == 0 {
        return Err("entry count is zero".to_string());
    }
    let offsets_start = count
        .checked_mul(OFFSET_BYTES)
        .and_then(|table| (len - TRAILER_BYTES).checked_sub(table))
        .ok_or_else(|| format!("offset table for {} entries does not fit", count))?;
    Ok((count, offsets_start))
}

/// Where the pieces of one encoded entry live inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryLayout {
    pub key_start: usize,
    pub key_end: usize,
    pub ts: i64,
    /// `(start, end)` of the value bytes; `None` for tombstones.
    pub value: Option<(usize, usize)>,
}

/// Checks that a complete entry starts at `at` and ends no later than
/// `limit`, returning its layout.
pub(crate) fn check_entry(buf: &[u8], at: usize, limit: usize) -> Option<EntryLayout> {
    let limit = limit.min(buf.len());
    let key_start = at.checked_add(LEN_BYTES).filter(|&p| p <= limit)?;
    let key_len = BigEndian::read_u32(&buf[at..key_start]) as usize;
    let key_end = key_start.checked_add(key_len)?;
    let ts_end = key_end.checked_add(TS_BYTES).filter(|&p| p <= limit)?;
    let stored_ts = BigEndian::read_i64(&buf[key_end..ts_end]);

    if stored_ts < 0 {
        return Some(EntryLayout {
            key_start,
            key_end,
            ts: stored_ts.checked_neg()?,
            value: None,
        });
    }

    let value_start = ts_end.checked_add(LEN_BYTES).filter(|&p| p <= limit)?;
    let value_len = BigEndian::read_u32(&buf[ts_end..value_start]) as usize;
    let value_end = value_start.checked_add(value_len).filter(|&p| p <= limit)?;
    Some(EntryLayout {
        key_start,
        key_end,
        ts: stored_ts,
        value: Some((value_start, value_end)),
    })
}

/// Layout of an entry already proven complete by [`check_entry`].
pub(crate) fn entry_layout(buf: &[u8], at: usize) -> EntryLayout {
    let key_start = at + LEN_BYTES;
    let key_end = key_start + BigEndian::read_u32(&buf[at..key_start]) as usize;
    let ts_end = key_end + TS_BYTES;
    let stored_ts = BigEndian::read_i64(&buf[key_end..ts_end]);
    if stored_ts < 0 {
        return EntryLayout {
            key_start,
            key_end,
            ts: -stored_ts,
            value: None,
        };
    }
    let value_start = ts_end + LEN_BYTES;
    let value_end = value_start + BigEndian::read_u32(&buf[ts_end..value_start]) as usize;
    EntryLayout {
        key_start,
        key_end,
        ts: stored_ts,
        value: Some((value_start, value_end)),
    }
}
