//! # Engine - LevelKV Storage Engine
//!
//! Ties the [`memtable`] and [`sstable`] crates together into an embedded
//! LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────────┐
//! │                        ENGINE                            │
//! │                                                          │
//! │ write.rs → MemTablePool (current buffer)                 │
//! │              |                                           │
//! │              |  (size > flush threshold?)                │
//! │              v                                           │
//! │           pending[gen] → Flusher (flusher-N threads)     │
//! │                              |                           │
//! │                              v                           │
//! │           InstallListener → SsTablePool::add_table       │
//! │                              |                           │
//! │                              v                           │
//! │           FlatPool  (compact on demand)                  │
//! │           LeveledPool (compactor thread, L0..L3)         │
//! │                                                          │
//! │ read.rs → collapse(memtables, tables), newest ts wins    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module            | Purpose                                              |
//! |-------------------|------------------------------------------------------|
//! | [`lib.rs`]        | `Engine` struct, `open`, accessors, `Debug`, `Drop`  |
//! | [`write`]         | `upsert()`, `remove()`, `flush()`, `close()`         |
//! | [`read`]          | `get()`, `iter()`, `range()`                         |
//! | [`compaction`]    | `compact()`                                          |
//! | [`memtable_pool`] | current and pending buffers, flush scheduling        |
//! | [`flusher`]       | background flush workers                             |
//! | [`pool`]          | `SsTablePool` trait and the flat pool                |
//! | [`leveled`]       | leveled pool and its compactor                       |
//! | [`naming`]        | table file names, startup scan                       |
//!
//! ## Durability
//!
//! There is no write-ahead log. A write is durable once the buffer holding
//! it has been flushed; [`Engine::flush`] and [`Engine::close`] force that.
//! Tables are written to a temporary file, fsynced and renamed into place,
//! so a crash never leaves a half-written `.db` file behind.

mod compaction;
mod error;
mod flusher;
mod generation;
mod level;
mod leveled;
mod memtable_pool;
mod naming;
mod pool;
mod read;
mod write;

use anyhow::Result;
use memtable::{LogicalClock, Table};
use parking_lot::RwLock;
use sstable::SsTable;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, info};

pub use config::{CompactionStyle, EngineConfig};
pub use error::EngineError;
pub use flusher::{FlushListener, Flusher};
pub use generation::GenerationProvider;
pub use level::{Level, LevelTable};
pub use leveled::{LeveledPool, LeveledSettings, LEVELS};
pub use memtable_pool::MemTablePool;
pub use naming::{FileManager, Layout, TableFile};
pub use pool::{FlatPool, SsTablePool};

pub(crate) struct EngineShared {
    /// Readers snapshot memtables and tables under the shared side; a flush
    /// install moves a buffer to disk under the exclusive side, so no reader
    /// sees it twice or not at all.
    pub(crate) lock: RwLock<()>,
    pub(crate) memtables: MemTablePool,
    pub(crate) tables: Box<dyn SsTablePool>,
    pub(crate) flusher: Arc<Flusher>,
    pub(crate) files: Arc<FileManager>,
    pub(crate) config: EngineConfig,
    pub(crate) closed: AtomicBool,
}

/// Installs flushed buffers into the on-disk pool.
struct InstallListener {
    shared: Weak<EngineShared>,
}

impl FlushListener for InstallListener {
    fn flushed(&self, generation: u32, table: SsTable) {
        if let Some(shared) = self.shared.upgrade() {
            let _guard = shared.lock.write();
            shared.memtables.flushed(generation);
            shared.tables.add_table(generation, table);
        }
    }

    fn flush_failed(&self, generation: u32) {
        if let Some(shared) = self.shared.upgrade() {
            let _guard = shared.lock.write();
            shared.memtables.flush_failed(generation);
        }
    }
}

/// The storage engine.
///
/// # Write Path
///
/// 1. Stamp the write with the next logical timestamp.
/// 2. Insert it into the current memtable.
/// 3. If the memtable now exceeds the flush threshold, move it to the
///    pending set under a fresh generation and hand it to the flusher.
///
/// # Read Path
///
/// Every source (current buffer, pending buffers, on-disk tables) is merged
/// by key; for each key the entry with the highest timestamp wins, and
/// tombstones hide the key.
///
/// # Recovery
///
/// [`Engine::open`] deletes leftover `.tmp` files, opens every valid table
/// in the data directory and skips corrupt ones.
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.shared.files.dir())
            .field("compaction", &self.shared.config.compaction)
            .field("flush_threshold", &self.shared.config.flush_threshold_bytes)
            .field("memtable_size", &self.memtable_size())
            .field("memtable_entries", &self.memtable_count())
            .field("pending_flushes", &self.pending_flushes())
            .field("disk_size", &self.disk_size())
            .field("table_count", &self.table_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) the store described by `config`.
    ///
    /// # Recovery Steps
    ///
    /// 1. Validate the configuration.
    /// 2. Create the data directory if it does not exist.
    /// 3. Remove leftover `.tmp` files from interrupted writes.
    /// 4. Open every table file, skipping the ones that fail validation.
    /// 5. Seed the generation counter past the highest generation on disk.
    /// 6. Start the flush workers and, for the leveled style, the compactor.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let layout = match config.compaction {
            CompactionStyle::Flat => Layout::Flat,
            CompactionStyle::Leveled => Layout::Leveled,
        };
        let files = Arc::new(FileManager::new(&config.data_dir, layout)?);
        let generations = Arc::new(GenerationProvider::default());
        let flusher = Arc::new(Flusher::new(Arc::clone(&files), config.flusher_threads)?);

        let tables: Box<dyn SsTablePool> = match config.compaction {
            CompactionStyle::Flat => Box::new(FlatPool::open(
                Arc::clone(&files),
                Arc::clone(&generations),
                Arc::clone(&flusher),
            )?),
            CompactionStyle::Leveled => Box::new(LeveledPool::open(
                Arc::clone(&files),
                Arc::clone(&generations),
                Arc::clone(&flusher),
                LeveledSettings {
                    compaction_threshold: config.compaction_threshold_bytes,
                    target_table_size: config.target_table_size_bytes,
                    period: config.compaction_period,
                    timeout: config.compaction_timeout,
                },
            )?),
        };

        let memtables = MemTablePool::new(
            Arc::new(LogicalClock::new()),
            Arc::clone(&generations),
            Arc::clone(&flusher),
            config.flush_threshold_bytes,
        );

        let shared = Arc::new(EngineShared {
            lock: RwLock::new(()),
            memtables,
            tables,
            flusher: Arc::clone(&flusher),
            files,
            config,
            closed: AtomicBool::new(false),
        });
        flusher.add_listener(Arc::new(InstallListener {
            shared: Arc::downgrade(&shared),
        }));

        info!(
            dir = %shared.files.dir().display(),
            compaction = ?shared.config.compaction,
            tables = shared.tables.tables().len(),
            "engine opened"
        );
        Ok(Self { shared })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        self.shared.files.dir()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Encoded bytes held by the current and pending memtables.
    #[must_use]
    pub fn memtable_size(&self) -> u64 {
        self.shared.memtables.size_in_bytes()
    }

    /// Distinct keys per memtable, summed over current and pending buffers.
    #[must_use]
    pub fn memtable_count(&self) -> usize {
        self.shared.memtables.count()
    }

    /// Buffers handed to the flusher and not yet installed.
    #[must_use]
    pub fn pending_flushes(&self) -> usize {
        self.shared.memtables.pending_count()
    }

    /// Bytes across every installed table file.
    #[must_use]
    pub fn disk_size(&self) -> u64 {
        self.shared.tables.size_in_bytes()
    }

    /// Entries across every installed table, tombstones and shadowed
    /// versions included.
    #[must_use]
    pub fn disk_count(&self) -> usize {
        self.shared.tables.count()
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.shared.tables.tables().len()
    }
}

/// Best-effort close on drop.
///
/// Pending buffers are flushed and background threads stopped. Errors are
/// logged because `Drop` cannot return them.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %format!("{:#}", e), "close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests;
