//! Background flush workers.
//!
//! ```text
//! schedule_flush(gen, buffer) ──► channel ──► flusher-N ──► <gen>.tmp ──► rename ──► <gen>.db
//!        │                                        │
//!   barrier.register()                   listeners.flushed(gen, table)
//!                                          barrier.arrive()
//! ```
//!
//! `close()` waits until every registered flush has arrived at the barrier,
//! then stops the workers.

use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use memtable::{MemTable, Table, TableEntry};
use parking_lot::{Condvar, Mutex, RwLock};
use sstable::{SsTable, SsTableWriter};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::naming::FileManager;

/// Receives the outcome of every scheduled flush.
pub trait FlushListener: Send + Sync {
    /// The buffer for `generation` is now durable as `table`.
    fn flushed(&self, generation: u32, table: SsTable);

    /// Writing `generation` failed; the buffer will not be retried.
    fn flush_failed(&self, generation: u32);
}

/// Party-counted barrier: each scheduled flush registers, each finished
/// flush arrives, and [`wait`](JoinBarrier::wait) blocks until none remain.
#[derive(Debug, Default)]
struct JoinBarrier {
    parties: Mutex<usize>,
    drained: Condvar,
}

impl JoinBarrier {
    fn register(&self) {
        *self.parties.lock() += 1;
    }

    fn arrive(&self) {
        let mut parties = self.parties.lock();
        *parties = parties.saturating_sub(1);
        if *parties == 0 {
            self.drained.notify_all();
        }
    }

    fn wait(&self) {
        let mut parties = self.parties.lock();
        while *parties > 0 {
            self.drained.wait(&mut parties);
        }
    }

    fn pending(&self) -> usize {
        *self.parties.lock()
    }
}

/// Arrives at the barrier when dropped, so a panicking flush still counts.
struct Arrival<'a>(&'a JoinBarrier);

impl Drop for Arrival<'_> {
    fn drop(&mut self) {
        self.0.arrive();
    }
}

struct FlushTask {
    generation: u32,
    buffer: Arc<MemTable>,
}

struct FlushShared {
    files: Arc<FileManager>,
    listeners: RwLock<Vec<Arc<dyn FlushListener>>>,
    barrier: JoinBarrier,
}

impl FlushShared {
    fn write<I>(&self, generation: u32, level: usize, entries: I) -> Result<SsTable>
    where
        I: IntoIterator<Item = TableEntry>,
    {
        let tmp = self.files.temp_path(generation, level);
        let path = self.files.table_path(generation, level);
        SsTableWriter::write_entries(&tmp, &path, entries)
            .with_context(|| format!("writing generation {} to {}", generation, path.display()))
    }

    fn run(&self, task: FlushTask) {
        let started = Instant::now();
        let generation = task.generation;
        match self.write(generation, 0, task.buffer.iter_all()) {
            Ok(table) => {
                info!(
                    generation,
                    entries = table.count(),
                    bytes = table.size_in_bytes(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "memtable flushed"
                );
                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    listener.flushed(generation, table.clone());
                }
            }
            Err(e) => {
                error!(generation, error = %format!("{:#}", e), "flush failed, generation dropped");
                self.notify_failed(generation);
            }
        }
    }

    fn notify_failed(&self, generation: u32) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.flush_failed(generation);
        }
    }
}

/// Fixed pool of flush worker threads.
pub struct Flusher {
    shared: Arc<FlushShared>,
    sender: Mutex<Option<Sender<FlushTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Flusher {
    /// Starts `threads` workers named `flusher-N`.
    pub fn new(files: Arc<FileManager>, threads: usize) -> Result<Self> {
        let shared = Arc::new(FlushShared {
            files,
            listeners: RwLock::new(Vec::new()),
            barrier: JoinBarrier::default(),
        });
        let (sender, receiver) = unbounded();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let receiver: Receiver<FlushTask> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("flusher-{}", i))
                .spawn(move || {
                    for task in receiver.iter() {
                        let _arrival = Arrival(&shared.barrier);
                        shared.run(task);
                    }
                })
                .context("spawning flusher thread")?;
            workers.push(handle);
        }

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn FlushListener>) {
        self.shared.listeners.write().push(listener);
    }

    /// Queues `buffer` to be written as `generation` and returns immediately.
    ///
    /// After [`close`](Self::close) the buffer is reported as failed instead.
    pub fn schedule_flush(&self, generation: u32, buffer: Arc<MemTable>) {
        self.shared.barrier.register();
        debug!(generation, bytes = buffer.size_in_bytes(), "flush scheduled");

        let task = FlushTask { generation, buffer };
        let rejected = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(task).err().map(|e| e.into_inner()),
            None => Some(task),
        };
        if let Some(task) = rejected {
            error!(generation = task.generation, "flusher is closed, buffer dropped");
            self.shared.notify_failed(task.generation);
            self.shared.barrier.arrive();
        }
    }

    /// Writes `entries` as `(generation, level)` on the calling thread.
    /// Listeners are not notified.
    pub fn flush_entries<I>(&self, generation: u32, level: usize, entries: I) -> Result<SsTable>
    where
        I: IntoIterator<Item = TableEntry>,
    {
        self.shared.write(generation, level, entries)
    }

    /// Number of scheduled flushes that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.barrier.pending()
    }

    /// Blocks until every flush scheduled so far has finished.
    pub fn wait_idle(&self) {
        self.shared.barrier.wait();
    }

    /// Blocks until every scheduled flush has finished, then stops the
    /// workers. Idempotent.
    pub fn close(&self) {
        self.wait_idle();
        drop(self.sender.lock().take());
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("flusher worker panicked");
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.close();
    }
}
