//! The write path: one current memtable plus buffers awaiting flush.
//!
//! ```text
//!             upsert/remove
//!                  │
//!                  ▼
//!   current ──(size > threshold)──► pending[gen] ──► Flusher ──► flushed(gen)
//!      ▲                                                          │
//!      └─────────────── fresh MemTable                  pending.remove(gen)
//! ```

use bytes::Bytes;
use memtable::{EntryIter, LogicalClock, MemTable, Table};
use parking_lot::RwLock;
use sstable::collapse_boxed;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::EngineError;
use crate::flusher::Flusher;
use crate::generation::GenerationProvider;

struct PoolState {
    current: Arc<MemTable>,
    pending: BTreeMap<u32, Arc<MemTable>>,
}

impl PoolState {
    /// Moves the current buffer into `pending` under a fresh generation and
    /// installs an empty one.
    fn rotate(&mut self, generations: &GenerationProvider) -> (u32, Arc<MemTable>) {
        let generation = generations.next_generation();
        let buffer = std::mem::replace(&mut self.current, Arc::new(MemTable::new()));
        self.pending.insert(generation, Arc::clone(&buffer));
        (generation, buffer)
    }

    /// Current buffer first, then pending buffers newest first.
    fn buffers(&self) -> Vec<Arc<MemTable>> {
        std::iter::once(Arc::clone(&self.current))
            .chain(self.pending.values().rev().cloned())
            .collect()
    }
}

/// Owns the mutable side of the engine.
///
/// Writes go to the current buffer under the shared side of the lock; the
/// buffer swap on a threshold trip takes the exclusive side and is
/// re-checked there so a buffer is submitted once.
pub struct MemTablePool {
    state: RwLock<PoolState>,
    clock: Arc<LogicalClock>,
    generations: Arc<GenerationProvider>,
    flusher: Arc<Flusher>,
    flush_threshold: u64,
    closed: AtomicBool,
}

impl MemTablePool {
    pub fn new(
        clock: Arc<LogicalClock>,
        generations: Arc<GenerationProvider>,
        flusher: Arc<Flusher>,
        flush_threshold: u64,
    ) -> Self {
        Self {
            state: RwLock::new(PoolState {
                current: Arc::new(MemTable::new()),
                pending: BTreeMap::new(),
            }),
            clock,
            generations,
            flusher,
            flush_threshold,
            closed: AtomicBool::new(false),
        }
    }

    pub fn upsert(&self, key: Bytes, value: Bytes) -> Result<(), EngineError> {
        self.write(|buffer, ts| buffer.upsert(key, value, ts))
    }

    pub fn remove(&self, key: Bytes) -> Result<(), EngineError> {
        self.write(|buffer, ts| buffer.remove(key, ts))
    }

    fn write(&self, apply: impl FnOnce(&MemTable, i64)) -> Result<(), EngineError> {
        let size = {
            let state = self.state.read();
            if self.closed.load(Ordering::SeqCst) {
                return Err(EngineError::Closed);
            }
            apply(&state.current, self.clock.now());
            state.current.size_in_bytes()
        };

        if size > self.flush_threshold {
            self.enqueue_flush();
        }
        Ok(())
    }

    fn enqueue_flush(&self) {
        let (generation, buffer) = {
            let mut state = self.state.write();
            if state.current.size_in_bytes() <= self.flush_threshold {
                return;
            }
            state.rotate(&self.generations)
        };
        debug!(generation, bytes = buffer.size_in_bytes(), "memtable rotated");
        self.flusher.schedule_flush(generation, buffer);
    }

    /// Submits the current buffer regardless of its size. Returns the
    /// generation it was given, or `None` when the buffer was empty.
    pub fn flush_now(&self) -> Result<Option<u32>, EngineError> {
        let submitted = {
            let mut state = self.state.write();
            if self.closed.load(Ordering::SeqCst) {
                return Err(EngineError::Closed);
            }
            (!state.current.is_empty()).then(|| state.rotate(&self.generations))
        };
        Ok(submitted.map(|(generation, buffer)| {
            self.flusher.schedule_flush(generation, buffer);
            generation
        }))
    }

    /// The flush of `generation` is durable; its buffer is no longer needed.
    pub fn flushed(&self, generation: u32) {
        self.state.write().pending.remove(&generation);
    }

    /// The flush of `generation` failed; the buffer is dropped without retry.
    pub fn flush_failed(&self, generation: u32) {
        self.state.write().pending.remove(&generation);
    }

    /// Submits a non-empty current buffer for a final flush and rejects
    /// further writes. Idempotent.
    pub fn close(&self) {
        let submitted = {
            let mut state = self.state.write();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            (!state.current.is_empty()).then(|| state.rotate(&self.generations))
        };
        if let Some((generation, buffer)) = submitted {
            debug!(generation, "final memtable flush");
            self.flusher.schedule_flush(generation, buffer);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of buffers handed to the flusher and not yet installed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    fn buffers(&self) -> Vec<Arc<MemTable>> {
        self.state.read().buffers()
    }
}

impl Table for MemTablePool {
    fn size_in_bytes(&self) -> u64 {
        self.buffers().iter().map(|b| b.size_in_bytes()).sum()
    }

    fn count(&self) -> usize {
        self.buffers().iter().map(|b| b.count()).sum()
    }

    fn iter_from(&self, from: &[u8]) -> EntryIter {
        collapse_boxed(self.buffers().iter().map(|b| b.iter_from(from)).collect())
    }

    fn range(&self, from: &[u8], to: Option<&[u8]>) -> EntryIter {
        collapse_boxed(self.buffers().iter().map(|b| b.range(from, to)).collect())
    }
}
