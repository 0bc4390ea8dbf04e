//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the LevelKV storage engine.
//!
//! When a [`memtable::MemTable`] exceeds its flush threshold the engine
//! writes it to disk as an SSTable; compaction writes new ones from merged
//! streams. SSTables are *write-once, read-many*: once published they are
//! never modified, only replaced and deleted.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ ENTRIES (sorted by key, one version per key)                  │
//! │                                                               │
//! │ key_len (u32) | key | ts (i64) | [val_len (u32) | val]        │
//! │                                                               │
//! │ ts is negated for tombstones, which carry no value section.   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ OFFSETS                                                       │
//! │                                                               │
//! │ offset (u32) of each entry, from the start of the file        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ TRAILER (always last 8 bytes)                                 │
//! │                                                               │
//! │ count (u32) | magic (u32) = 0xCAFEFEED                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. Files are memory-mapped by [`SsTable`] and
//! searched with a binary search over the offset table.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{SsTableError, OFFSET_BYTES, SSTABLE_MAGIC, TRAILER_BYTES};
pub use merge::{alive, collapse, collapse_boxed, Collapse, MergeIterator};
pub use reader::{SsTable, SsTableIter};
pub use writer::SsTableWriter;

#[cfg(test)]
mod tests;
