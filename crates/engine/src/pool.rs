//! The set of immutable tables currently backing reads.

use anyhow::{Context, Result};
use memtable::{EntryIter, Table, TableEntry};
use parking_lot::{Mutex, RwLock};
use sstable::{alive, collapse, collapse_boxed, SsTable};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::flusher::Flusher;
use crate::generation::GenerationProvider;
use crate::naming::{FileManager, TableFile};

/// An on-disk table pool: a [`Table`] over every installed table plus the
/// structural operations used by flushes and compaction.
pub trait SsTablePool: Table {
    /// Installed tables as `(generation, table)`, oldest generation first.
    fn tables(&self) -> Vec<(u32, SsTable)>;

    /// Installs a freshly flushed table.
    fn add_table(&self, generation: u32, table: SsTable);

    /// Uninstalls a table without deleting its file.
    fn remove_table(&self, generation: u32) -> Option<SsTable>;

    /// Merges tables together; may block while another pass finishes.
    fn compact(&self) -> Result<()>;

    /// Stops background work. Installed tables stay readable.
    fn close(&self);
}

/// Opens every scanned table file, logging and skipping the ones that fail
/// validation. Seeds `generations` with one past the highest generation
/// seen, corrupt files included, so their names are never reused.
pub(crate) fn open_tables(
    files: &[TableFile],
    generations: &GenerationProvider,
) -> Vec<(TableFile, SsTable)> {
    let mut opened = Vec::with_capacity(files.len());
    for file in files {
        match SsTable::open(&file.path) {
            Ok(table) => opened.push((file.clone(), table)),
            Err(e) => error!(path = %file.path.display(), error = %e, "skipping unreadable table"),
        }
    }
    if let Some(max) = files.iter().map(|f| f.generation).max() {
        let next = max.saturating_add(1);
        if next > generations.peek() {
            generations.set_next_generation(next);
        }
    }
    opened
}

/// All tables in one unordered set, compacted on demand into one table.
pub struct FlatPool {
    tables: RwLock<BTreeMap<u32, SsTable>>,
    files: Arc<FileManager>,
    generations: Arc<GenerationProvider>,
    flusher: Arc<Flusher>,
    compaction: Mutex<()>,
}

impl FlatPool {
    pub fn open(
        files: Arc<FileManager>,
        generations: Arc<GenerationProvider>,
        flusher: Arc<Flusher>,
    ) -> Result<Self> {
        let scanned = files.scan()?;
        let tables: BTreeMap<u32, SsTable> = open_tables(&scanned, &generations)
            .into_iter()
            .map(|(file, table)| (file.generation, table))
            .collect();
        info!(
            dir = %files.dir().display(),
            tables = tables.len(),
            next_generation = generations.peek(),
            "flat pool opened"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            files,
            generations,
            flusher,
            compaction: Mutex::new(()),
        })
    }

    /// Newest generation first.
    fn snapshot(&self) -> Vec<(u32, SsTable)> {
        self.tables
            .read()
            .iter()
            .rev()
            .map(|(g, t)| (*g, t.clone()))
            .collect()
    }
}

impl Table for FlatPool {
    fn size_in_bytes(&self) -> u64 {
        self.tables.read().values().map(|t| t.size_in_bytes()).sum()
    }

    fn count(&self) -> usize {
        self.tables.read().values().map(|t| t.count()).sum()
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        collapse_boxed(self.snapshot().iter().map(|(_, t)| t.iter_from(from)).collect())
    }

    fn range(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        collapse_boxed(self.snapshot().iter().map(|(_, t)| t.range(from, to)).collect())
    }
}

impl SsTablePool for FlatPool {
    fn tables(&self) -> Vec<(u32, SsTable)> {
        self.tables
            .read()
            .iter()
            .map(|(g, t)| (*g, t.clone()))
            .collect()
    }

    fn add_table(&self, generation: u32, table: SsTable) {
        self.tables.write().insert(generation, table);
    }

    fn remove_table(&self, generation: u32) -> Option<SsTable> {
        self.tables.write().remove(&generation)
    }

    /// Rewrites every installed table into at most one new table holding
    /// only the newest version of each key. Tombstones are dropped unless a
    /// flush is still in flight.
    fn compact(&self) -> Result<()> {
        let _running = self.compaction.lock();

        // A buffer still being flushed may hold older versions a dropped
        // tombstone was shadowing. Read before the snapshot so a flush that
        // lands in between cannot be missed.
        let flush_idle = self.flusher.pending() == 0;
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }

        let sources = snapshot.iter().map(|(_, t)| t.iter_all()).collect();
        let merged: Box<dyn Iterator<Item = TableEntry>> = if flush_idle {
            Box::new(alive(collapse(sources)))
        } else {
            Box::new(collapse(sources))
        };
        let mut merged = merged.peekable();
        let created = match merged.peek() {
            Some(_) => {
                let generation = self.generations.next_generation();
                let table = self
                    .flusher
                    .flush_entries(generation, 0, merged)
                    .context("flat compaction")?;
                Some((generation, table))
            }
            None => None,
        };

        {
            let mut tables = self.tables.write();
            for (generation, _) in &snapshot {
                tables.remove(generation);
            }
            if let Some((generation, table)) = &created {
                tables.insert(*generation, table.clone());
            }
        }

        match &created {
            Some((generation, table)) => info!(
                inputs = snapshot.len(),
                generation = *generation,
                entries = table.count(),
                bytes = table.size_in_bytes(),
                "flat compaction finished"
            ),
            None => info!(inputs = snapshot.len(), "tables collapsed into nothing"),
        }

        for (generation, _) in &snapshot {
            self.files.remove(*generation, 0);
        }
        Ok(())
    }

    fn close(&self) {}
}
