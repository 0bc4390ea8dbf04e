//! # Config - LevelKV engine settings
//!
//! A single [`EngineConfig`] value carries every knob the storage engine
//! reads at open time. Values come from [`EngineConfig::default`], the
//! `with_*` builder methods, or the process environment via
//! [`EngineConfig::from_env`].
//!
//! ```text
//! LEVELKV_DATA_DIR              data directory            (default: "data")
//! LEVELKV_FLUSH_KB              memtable flush threshold  (default: 4096 KiB)
//! LEVELKV_FLUSHER_THREADS       flush worker count        (default: 8)
//! LEVELKV_COMPACTION            "flat" | "leveled"        (default: "leveled")
//! LEVELKV_COMPACTION_KB         level-0 compaction trigger (default: 16384 KiB)
//! LEVELKV_TABLE_KB              target table size         (default: 4096 KiB)
//! LEVELKV_COMPACTION_PERIOD_MS  compactor wake-up period  (default: 1000 ms)
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default memtable size (bytes) that triggers a flush.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 4 * 1024 * 1024;
/// Default number of flush worker threads.
pub const DEFAULT_FLUSHER_THREADS: usize = 8;
/// Default level-0 size (bytes) above which the compactor runs a pass.
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 16 * 1024 * 1024;
/// Default size (bytes) of a table produced by leveled compaction into level 0.
pub const DEFAULT_TARGET_TABLE_SIZE: u64 = 4 * 1024 * 1024;
/// Default compactor wake-up period.
pub const DEFAULT_COMPACTION_PERIOD: Duration = Duration::from_secs(1);
/// Default time a caller of `compact()` waits for an in-flight pass.
pub const DEFAULT_COMPACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors reported by [`EngineConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("unknown compaction style: {0:?}")]
    UnknownStyle(String),
}

/// How on-disk tables are organised and compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionStyle {
    /// One flat set of tables, compacted on demand into a single table.
    Flat,
    /// Four levels with a background compactor.
    #[default]
    Leveled,
}

impl FromStr for CompactionStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(CompactionStyle::Flat),
            "leveled" | "levelled" => Ok(CompactionStyle::Leveled),
            other => Err(ConfigError::UnknownStyle(other.to_string())),
        }
    }
}

/// Settings read by `Engine::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub flush_threshold_bytes: u64,
    pub flusher_threads: usize,
    pub compaction: CompactionStyle,
    pub compaction_threshold_bytes: u64,
    pub target_table_size_bytes: u64,
    pub compaction_period: Duration,
    pub compaction_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD,
            flusher_threads: DEFAULT_FLUSHER_THREADS,
            compaction: CompactionStyle::default(),
            compaction_threshold_bytes: DEFAULT_COMPACTION_THRESHOLD,
            target_table_size_bytes: DEFAULT_TARGET_TABLE_SIZE,
            compaction_period: DEFAULT_COMPACTION_PERIOD,
            compaction_timeout: DEFAULT_COMPACTION_TIMEOUT,
        }
    }
}

/// Reads a configuration value from the environment, falling back to `default`
/// when the variable is absent or does not parse.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Default settings rooted at `data_dir`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Builds a config from `LEVELKV_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let kib = |key: &str, default_bytes: u64| env_or(key, default_bytes / 1024) * 1024;

        Self {
            data_dir: std::env::var("LEVELKV_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            flush_threshold_bytes: kib("LEVELKV_FLUSH_KB", defaults.flush_threshold_bytes),
            flusher_threads: env_or("LEVELKV_FLUSHER_THREADS", defaults.flusher_threads),
            compaction: env_or("LEVELKV_COMPACTION", defaults.compaction),
            compaction_threshold_bytes: kib(
                "LEVELKV_COMPACTION_KB",
                defaults.compaction_threshold_bytes,
            ),
            target_table_size_bytes: kib("LEVELKV_TABLE_KB", defaults.target_table_size_bytes),
            compaction_period: Duration::from_millis(env_or(
                "LEVELKV_COMPACTION_PERIOD_MS",
                defaults.compaction_period.as_millis() as u64,
            )),
            compaction_timeout: defaults.compaction_timeout,
        }
    }

    #[must_use]
    pub fn with_flush_threshold(mut self, bytes: u64) -> Self {
        self.flush_threshold_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_flusher_threads(mut self, threads: usize) -> Self {
        self.flusher_threads = threads;
        self
    }

    #[must_use]
    pub fn with_compaction(mut self, style: CompactionStyle) -> Self {
        self.compaction = style;
        self
    }

    #[must_use]
    pub fn with_compaction_threshold(mut self, bytes: u64) -> Self {
        self.compaction_threshold_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_target_table_size(mut self, bytes: u64) -> Self {
        self.target_table_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_compaction_period(mut self, period: Duration) -> Self {
        self.compaction_period = period;
        self
    }

    #[must_use]
    pub fn with_compaction_timeout(mut self, timeout: Duration) -> Self {
        self.compaction_timeout = timeout;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_threshold_bytes == 0 {
            return Err(ConfigError::Zero("flush_threshold_bytes"));
        }
        if self.flusher_threads == 0 {
            return Err(ConfigError::Zero("flusher_threads"));
        }
        if self.compaction == CompactionStyle::Leveled {
            if self.compaction_threshold_bytes == 0 {
                return Err(ConfigError::Zero("compaction_threshold_bytes"));
            }
            if self.target_table_size_bytes == 0 {
                return Err(ConfigError::Zero("target_table_size_bytes"));
            }
            if self.compaction_period.is_zero() {
                return Err(ConfigError::Zero("compaction_period"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
