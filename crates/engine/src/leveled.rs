//! Leveled on-disk pool and its background compactor.
//!
//! ```text
//!  flush ──► L0  (overlapping, generation order)
//!             │  whole level merged when size(L0) > threshold
//!             ▼
//!            L1  (disjoint, sorted by highest key)
//!             │  largest table pushed down when size(L1) > 2 * threshold
//!             ▼
//!            L2 ──► L3                 (limit for Li is threshold * (i + 1))
//! ```
//!
//! A pass walks the levels top-down and stops at the first level that needs
//! no work. Merging into level `d` touches only the tables of `d` whose
//! ranges overlap the source; the source's keys below and above that overlap
//! are written as separate tables so untouched data is never rewritten.
//! Tombstones are dropped once no deeper level holds data, no flush was in
//! flight when the pass started, and no table outside the merge overlaps the
//! source from a level at or above it.

use anyhow::{Context, Result};
use bytes::Bytes;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use memtable::{EntryIter, Table, TableEntry};
use parking_lot::{Condvar, Mutex, RwLock};
use sstable::{alive, collapse, collapse_boxed, SsTable};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::flusher::Flusher;
use crate::generation::GenerationProvider;
use crate::level::{Level, LevelTable};
use crate::naming::FileManager;
use crate::pool::{open_tables, SsTablePool};

/// Number of levels in the pool.
pub const LEVELS: usize = 4;

/// Compaction tuning for a [`LeveledPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeveledSettings {
    /// Level-0 size that triggers a pass; level `i` may hold
    /// `compaction_threshold * (i + 1)` bytes.
    pub compaction_threshold: u64,
    /// Output table size for level `i` is `target_table_size * (i + 1)`.
    pub target_table_size: u64,
    pub period: Duration,
    pub timeout: Duration,
}

struct Inner {
    levels: Vec<Level>,
    /// Shared by readers snapshotting several levels, exclusive for installs
    /// that move tables between levels.
    structure: RwLock<()>,
    files: Arc<FileManager>,
    generations: Arc<GenerationProvider>,
    flusher: Arc<Flusher>,
    settings: LeveledSettings,
    running: Mutex<bool>,
    finished: Condvar,
}

/// Clears the single-flight flag when a pass ends, even by panic.
struct PassGuard<'a>(&'a Inner);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *self.0.running.lock() = false;
        self.0.finished.notify_all();
    }
}

fn through(iter: EntryIter, last: Bytes) -> EntryIter {
    Box::new(iter.take_while(move |e| e.key() <= &last))
}

fn after(iter: EntryIter, key: Bytes) -> EntryIter {
    Box::new(iter.skip_while(move |e| e.key() == &key))
}

impl Inner {
    fn compact_if_needed(&self) {
        let size = self.levels[0].size_in_bytes();
        if size > self.settings.compaction_threshold {
            debug!(level0_bytes = size, "level 0 over threshold");
            if let Err(e) = self.compact() {
                error!(error = %format!("{:#}", e), "background compaction failed");
            }
        }
    }

    /// Runs a pass, or waits (bounded by the timeout) for the one in flight.
    fn compact(&self) -> Result<()> {
        {
            let mut running = self.running.lock();
            if *running {
                let waited = self
                    .finished
                    .wait_while_for(&mut running, |r| *r, self.settings.timeout);
                if waited.timed_out() {
                    warn!(
                        timeout_ms = self.settings.timeout.as_millis() as u64,
                        "gave up waiting for running compaction"
                    );
                }
                return Ok(());
            }
            *running = true;
        }
        let _pass = PassGuard(self);

        let started = Instant::now();
        // Read once, before level 0 is snapshotted: a flush that lands later
        // in the pass installs a table the pass never merges.
        let flush_idle = self.flusher.pending() == 0;
        for index in 0..LEVELS - 1 {
            if !self.compact_level(index, flush_idle)? {
                break;
            }
        }
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction pass finished"
        );
        Ok(())
    }

    /// Returns `false` when `index` needed no work and the pass should stop.
    fn compact_level(&self, index: usize, flush_idle: bool) -> Result<bool> {
        if index == 0 {
            let source = self.levels[0].snapshot();
            if !source.is_empty() {
                self.merge_into(0, source, flush_idle)?;
            }
            return Ok(true);
        }

        let level = &self.levels[index];
        let limit = self
            .settings
            .compaction_threshold
            .saturating_mul(index as u64 + 1);
        if level.size_in_bytes() <= limit {
            return Ok(false);
        }
        match level.largest() {
            Some(largest) => {
                self.merge_into(index, vec![largest], flush_idle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merges `source` (tables of level `src`) into level `src + 1` and
    /// swaps the result in.
    fn merge_into(&self, src: usize, source: Vec<LevelTable>, flush_idle: bool) -> Result<()> {
        let dst = src + 1;
        let (Some(lowest), Some(highest)) = (
            source.iter().map(|t| &t.lowest).min().cloned(),
            source.iter().map(|t| &t.highest).max().cloned(),
        ) else {
            return Ok(());
        };
        let overlap = self.levels[dst].overlapping(&lowest, &highest);

        let inputs = || source.iter().chain(overlap.iter());
        let total_bytes: u64 = inputs().map(|t| t.table.size_in_bytes()).sum();
        let total_count: u64 = inputs().map(|t| t.table.count() as u64).sum();
        let target = self
            .settings
            .target_table_size
            .saturating_mul(dst as u64 + 1)
            .max(1);
        let table_count = (total_bytes / target).max(1);
        let per_table = (total_count / table_count).max(1) as usize;
        // A buffer still being flushed may hold older versions a dropped
        // tombstone was shadowing.
        let drop_tombstones = flush_idle
            && self.levels[dst + 1..].iter().all(|l| l.is_empty())
            && !self.overlapped_above(src, &source, &lowest, &highest);

        let mut created = Vec::new();
        if let Err(e) = self.write_parts(&source, &overlap, dst, per_table, drop_tombstones, &mut created) {
            for t in &created {
                self.files.remove(t.generation, dst);
            }
            return Err(e.context(format!("compacting level {} into level {}", src, dst)));
        }

        {
            let _structure = self.structure.write();
            for t in &source {
                self.levels[src].remove(t.generation);
            }
            for t in &overlap {
                self.levels[dst].remove(t.generation);
            }
            for t in &created {
                self.levels[dst].add(t.clone());
            }
        }

        info!(
            from_level = src,
            to_level = dst,
            source_tables = source.len(),
            merged_tables = overlap.len(),
            created_tables = created.len(),
            bytes_in = total_bytes,
            bytes_out = created.iter().map(|t| t.table.size_in_bytes()).sum::<u64>(),
            tombstones_dropped = drop_tombstones,
            "level compacted"
        );

        for t in &source {
            self.files.remove(t.generation, src);
        }
        for t in &overlap {
            self.files.remove(t.generation, dst);
        }
        Ok(())
    }

    /// `true` when a level at or above `src` holds a table in
    /// `[lowest, highest]` that is not part of `source`.
    fn overlapped_above(
        &self,
        src: usize,
        source: &[LevelTable],
        lowest: &[u8],
        highest: &[u8],
    ) -> bool {
        self.levels[..=src].iter().any(|level| {
            level
                .overlapping(lowest, highest)
                .iter()
                .any(|t| source.iter().all(|s| s.generation != t.generation))
        })
    }

    /// Writes the merged output of `source` and `overlap` into level `dst`.
    ///
    /// With no overlap the source is re-chunked as is. Otherwise the source
    /// is split into the keys below the overlap, the keys inside it (merged
    /// with the overlapping tables), and the keys above it.
    fn write_parts(
        &self,
        source: &[LevelTable],
        overlap: &[LevelTable],
        dst: usize,
        per_table: usize,
        drop_tombstones: bool,
        created: &mut Vec<LevelTable>,
    ) -> Result<()> {
        // newest generation first
        let from = |key: &[u8], to: Option<&[u8]>| -> Vec<EntryIter> {
            source.iter().rev().map(|t| t.table.range(key, to)).collect()
        };
        let start: &[u8] = &[];

        let (Some(first), Some(last)) = (overlap.first(), overlap.last()) else {
            let merged = collapse(from(start, None));
            return self.write_chunks(merged, dst, per_table, drop_tombstones, created);
        };
        let overlap_low = first.lowest.clone();
        let overlap_high = last.highest.clone();

        let below = collapse(from(start, Some(&overlap_low[..])));
        self.write_chunks(below, dst, per_table, drop_tombstones, created)?;

        let mut inside: Vec<EntryIter> = from(&overlap_low[..], None)
            .into_iter()
            .map(|iter| through(iter, overlap_high.clone()))
            .collect();
        inside.extend(overlap.iter().map(|t| t.table.iter_all()));
        self.write_chunks(collapse(inside), dst, per_table, drop_tombstones, created)?;

        let above: Vec<EntryIter> = from(&overlap_high[..], None)
            .into_iter()
            .map(|iter| after(iter, overlap_high.clone()))
            .collect();
        self.write_chunks(collapse(above), dst, per_table, drop_tombstones, created)
    }

    /// Cuts `entries` into tables of at most `per_table` entries, each under
    /// a new generation.
    fn write_chunks<I>(
        &self,
        entries: I,
        level: usize,
        per_table: usize,
        drop_tombstones: bool,
        created: &mut Vec<LevelTable>,
    ) -> Result<()>
    where
        I: Iterator<Item = TableEntry>,
    {
        let entries: Box<dyn Iterator<Item = TableEntry>> = if drop_tombstones {
            Box::new(alive(entries))
        } else {
            Box::new(entries)
        };
        let mut entries = entries.peekable();

        while entries.peek().is_some() {
            let generation = self.generations.next_generation();
            let table = self
                .flusher
                .flush_entries(generation, level, entries.by_ref().take(per_table))?;
            created.push(LevelTable::new(generation, table));
        }
        Ok(())
    }
}

struct Compactor {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Four levels of tables with a periodic background compactor.
pub struct LeveledPool {
    inner: Arc<Inner>,
    compactor: Mutex<Option<Compactor>>,
}

impl LeveledPool {
    /// Loads `<generation>_<level>.db` files into their levels and starts
    /// the compactor thread.
    pub fn open(
        files: Arc<FileManager>,
        generations: Arc<GenerationProvider>,
        flusher: Arc<Flusher>,
        settings: LeveledSettings,
    ) -> Result<Self> {
        let levels: Vec<Level> = (0..LEVELS).map(Level::new).collect();
        let scanned = files.scan()?;
        for (file, table) in open_tables(&scanned, &generations) {
            match levels.get(file.level) {
                Some(level) => level.add(LevelTable::new(file.generation, table)),
                None => error!(
                    path = %file.path.display(),
                    level = file.level,
                    "skipping table in unknown level"
                ),
            }
        }
        info!(
            dir = %files.dir().display(),
            tables = ?levels.iter().map(|l| l.table_count()).collect::<Vec<_>>(),
            next_generation = generations.peek(),
            "leveled pool opened"
        );

        let inner = Arc::new(Inner {
            levels,
            structure: RwLock::new(()),
            files,
            generations,
            flusher,
            settings,
            running: Mutex::new(false),
            finished: Condvar::new(),
        });

        let (stop, stopped) = bounded::<()>(1);
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("compactor".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(worker.settings.period) {
                    Err(RecvTimeoutError::Timeout) => worker.compact_if_needed(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .context("spawning compactor thread")?;

        Ok(Self {
            inner,
            compactor: Mutex::new(Some(Compactor { stop, handle })),
        })
    }

    /// The levels, top first.
    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.inner.levels
    }

    fn sources(&self, from: &[u8], to: Option<&[u8]>) -> Vec<EntryIter> {
        let _structure = self.inner.structure.read();
        self.inner
            .levels
            .iter()
            .flat_map(|level| level.sources(from, to))
            .collect()
    }
}

impl Table for LeveledPool {
    fn size_in_bytes(&self) -> u64 {
        let _structure = self.inner.structure.read();
        self.inner.levels.iter().map(|l| l.size_in_bytes()).sum()
    }

    fn count(&self) -> usize {
        let _structure = self.inner.structure.read();
        self.inner.levels.iter().map(|l| l.count()).sum()
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        collapse_boxed(self.sources(from, None))
    }

    fn range(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        collapse_boxed(self.sources(from, to))
    }
}

impl SsTablePool for LeveledPool {
    fn tables(&self) -> Vec<(u32, SsTable)> {
        let _structure = self.inner.structure.read();
        let mut tables: Vec<(u32, SsTable)> = self
            .inner
            .levels
            .iter()
            .flat_map(|l| l.snapshot())
            .map(|t| (t.generation, t.table))
            .collect();
        tables.sort_by_key(|(generation, _)| *generation);
        tables
    }

    fn add_table(&self, generation: u32, table: SsTable) {
        self.inner.levels[0].add(LevelTable::new(generation, table));
    }

    fn remove_table(&self, generation: u32) -> Option<SsTable> {
        let _structure = self.inner.structure.write();
        self.inner
            .levels
            .iter()
            .find_map(|l| l.remove(generation))
            .map(|t| t.table)
    }

    fn compact(&self) -> Result<()> {
        self.inner.compact()
    }

    /// Stops the compactor; a pass in flight runs to completion first.
    fn close(&self) {
        if let Some(compactor) = self.compactor.lock().take() {
            let _ = compactor.stop.send(());
            if compactor.handle.join().is_err() {
                error!("compactor thread panicked");
            }
        }
    }
}

impl Drop for LeveledPool {
    fn drop(&mut self) {
        SsTablePool::close(self);
    }
}
