use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out table generations.
///
/// One provider is shared by the memtable pool (flush buffers), the flusher
/// and the on-disk pool (compaction outputs). It is seeded at open time with
/// one past the highest generation found on disk.
#[derive(Debug, Default)]
pub struct GenerationProvider {
    next: AtomicU32,
}

impl GenerationProvider {
    pub fn new(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// Returns the next unused generation and advances the counter.
    pub fn next_generation(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn set_next_generation(&self, next: u32) {
        self.next.store(next, Ordering::SeqCst);
    }

    /// The value the next call to [`next_generation`](Self::next_generation)
    /// would return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::SeqCst)
    }
}
