use bytes::Bytes;
use memtable::{EntryIter, Table};
use parking_lot::RwLock;
use sstable::{collapse_boxed, SsTable};

/// A table installed in a level, with its key range cached.
#[derive(Debug, Clone)]
pub struct LevelTable {
    pub generation: u32,
    pub table: SsTable,
    pub lowest: Bytes,
    pub highest: Bytes,
}

impl LevelTable {
    pub fn new(generation: u32, table: SsTable) -> Self {
        Self {
            generation,
            lowest: table.lowest(),
            highest: table.highest(),
            table,
        }
    }

    /// `true` when `[lowest, highest]` intersects `[from, to]` (both inclusive).
    fn overlaps(&self, from: &[u8], to: &[u8]) -> bool {
        self.highest.as_ref() >= from && self.lowest.as_ref() <= to
    }
}

/// One tier of the leveled pool.
///
/// Level 0 holds raw flush output, kept in generation order, and its tables
/// may overlap. Deeper levels hold tables with disjoint key ranges, kept
/// sorted by `(highest, generation)`.
#[derive(Debug)]
pub struct Level {
    index: usize,
    tables: RwLock<Vec<LevelTable>>,
}

impl Level {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            tables: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    fn sort_key(&self, t: &LevelTable) -> (Bytes, u32) {
        match self.index {
            0 => (Bytes::new(), t.generation),
            _ => (t.highest.clone(), t.generation),
        }
    }

    pub fn add(&self, entry: LevelTable) {
        let mut tables = self.tables.write();
        let key = self.sort_key(&entry);
        let at = tables.partition_point(|t| self.sort_key(t) < key);
        tables.insert(at, entry);
    }

    pub fn remove(&self, generation: u32) -> Option<LevelTable> {
        let mut tables = self.tables.write();
        let at = tables.iter().position(|t| t.generation == generation)?;
        Some(tables.remove(at))
    }

    /// Every table in level order.
    pub fn snapshot(&self) -> Vec<LevelTable> {
        self.tables.read().clone()
    }

    /// Tables whose key range intersects `[from, to]`, in level order.
    pub fn overlapping(&self, from: &[u8], to: &[u8]) -> Vec<LevelTable> {
        self.tables
            .read()
            .iter()
            .filter(|t| t.overlaps(from, to))
            .cloned()
            .collect()
    }

    /// The table with the most bytes, oldest generation on ties.
    pub fn largest(&self) -> Option<LevelTable> {
        self.tables
            .read()
            .iter()
            .max_by(|a, b| {
                a.table
                    .size_in_bytes()
                    .cmp(&b.table.size_in_bytes())
                    .then_with(|| b.generation.cmp(&a.generation))
            })
            .cloned()
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Per-table iterators for a read of `[from, to)`, newest data first.
    ///
    /// Level 0 contributes every table, newest generation first. Deeper
    /// levels skip tables that end before `from` or start at or after `to`.
    pub fn sources(&self, from: &[u8], to: Option<&[u8]>) -> Vec<EntryIter> {
        let tables = self.tables.read();
        match self.index {
            0 => tables.iter().rev().map(|t| t.table.range(from, to)).collect(),
            _ => tables
                .iter()
                .filter(|t| t.highest.as_ref() >= from)
                .filter(|t| to.map_or(true, |to| t.lowest.as_ref() < to))
                .map(|t| t.table.range(from, to))
                .collect(),
        }
    }
}

impl Table for Level {
    fn size_in_bytes(&self) -> u64 {
        self.tables.read().iter().map(|t| t.table.size_in_bytes()).sum()
    }

    fn count(&self) -> usize {
        self.tables.read().iter().map(|t| t.table.count()).sum()
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        collapse_boxed(self.sources(from, None))
    }

    fn range(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        collapse_boxed(self.sources(from, to))
    }
}
