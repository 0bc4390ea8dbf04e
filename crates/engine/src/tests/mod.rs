use crate::*;
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use sstable::SsTable;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;


const STYLES: [CompactionStyle; 2] = [CompactionStyle::Flat, CompactionStyle::Leveled];

/// The compactor only wakes up once an hour, so tests drive compaction
/// explicitly.
fn config(dir: &Path, style: CompactionStyle) -> EngineConfig {
    EngineConfig::new(dir)
        .with_compaction(style)
        .with_flusher_threads(2)
        .with_compaction_period(Duration::from_secs(3600))
}

fn open(dir: &Path, style: CompactionStyle) -> Result<Engine> {
    Engine::open(config(dir, style))
}

/// Blocks until every scheduled flush has been installed.
fn settle(engine: &Engine) {
    engine.shared.flusher.wait_idle();
}

fn key(i: usize) -> String {
    format!("key-{:04}", i)
}

/// Names of the finalized table files in `dir`, sorted.
fn table_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.ends_with(".db") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn collect(engine: &Engine) -> Vec<(String, String)> {
    engine
        .iter(b"")
        .map(|(k, v)| {
            (
                String::from_utf8_lossy(&k).into_owned(),
                String::from_utf8_lossy(&v).into_owned(),
            )
        })
        .collect()
}

/// Holds every flushed table back until [`FlushGate::open`], then installs
/// it into `pool`. The flush stays pending while it waits.
struct FlushGate {
    pool: Arc<dyn SsTablePool>,
    open: Mutex<bool>,
    opened: Condvar,
}

impl FlushGate {
    fn new(pool: Arc<dyn SsTablePool>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            open: Mutex::new(false),
            opened: Condvar::new(),
        })
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl FlushListener for FlushGate {
    fn flushed(&self, generation: u32, table: SsTable) {
        let mut open = self.open.lock();
        self.opened.wait_while(&mut open, |open| !*open);
        drop(open);
        self.pool.add_table(generation, table);
    }

    fn flush_failed(&self, _generation: u32) {}
}
