use crate::*;
use anyhow::Result;
use memtable::TableEntry;
use std::path::Path;


/// Writes `entries` as `<name>.db` inside `dir` and opens it.
fn write_table(dir: &Path, name: &str, entries: Vec<TableEntry>) -> Result<SsTable> {
    let tmp = dir.join(format!("{}.tmp", name));
    let path = dir.join(format!("{}.db", name));
    Ok(SsTableWriter::write_entries(&tmp, &path, entries)?)
}

fn sample_entries() -> Vec<TableEntry> {
    vec![
        TableEntry::upsert("a", "apple", 1),
        TableEntry::upsert("b", "banana", 2),
        TableEntry::upsert("c", "", 3),
        TableEntry::tombstone("d", 4),
        TableEntry::upsert("f", "fig", 5),
    ]
}
