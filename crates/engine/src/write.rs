use anyhow::Result;
use bytes::Bytes;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::Engine;

impl Engine {
    /// Inserts or replaces `key`.
    ///
    /// Fails with [`EngineError::Closed`](crate::EngineError::Closed) after
    /// [`close`](Self::close).
    pub fn upsert(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        self.shared.memtables.upsert(key.into(), value.into())?;
        Ok(())
    }

    /// Writes a tombstone for `key`. Removing an absent key is not an error.
    pub fn remove(&self, key: impl Into<Bytes>) -> Result<()> {
        self.shared.memtables.remove(key.into())?;
        Ok(())
    }

    /// Writes the current memtable to disk and waits until every buffer
    /// submitted so far is installed.
    pub fn flush(&self) -> Result<()> {
        if let Some(generation) = self.shared.memtables.flush_now()? {
            debug!(generation, "forced flush");
        }
        self.shared.flusher.wait_idle();
        Ok(())
    }

    /// Flushes the remaining data, stops the flush workers and the
    /// compactor. Reads keep working; writes fail. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.memtables.close();
        self.shared.flusher.close();
        self.shared.tables.close();
        info!(dir = %self.shared.files.dir().display(), "engine closed");
        Ok(())
    }
}
