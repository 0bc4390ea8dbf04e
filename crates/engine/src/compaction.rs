use anyhow::Result;
use std::time::Instant;
use tracing::info;

use crate::{Engine, EngineError};

impl Engine {
    /// Runs a compaction pass on the calling thread.
    ///
    /// With the flat style every table is rewritten into at most one table.
    /// With the leveled style this is one compactor pass; if the background
    /// compactor is already running one, the call waits for it to finish
    /// instead of starting another.
    pub fn compact(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EngineError::Closed.into());
        }
        let started = Instant::now();
        let before = self.disk_size();
        self.shared.tables.compact()?;
        info!(
            bytes_before = before,
            bytes_after = self.disk_size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compaction requested"
        );
        Ok(())
    }
}
