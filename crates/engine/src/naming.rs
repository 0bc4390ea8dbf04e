//! File naming for table files.
//!
//! ```text
//! flat:     <generation>.db          (temp: <generation>.tmp)
//! leveled:  <generation>_<level>.db  (temp: <generation>_<level>.tmp)
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

const TABLE_EXT: &str = "db";
const TMP_EXT: &str = "tmp";

/// Which naming scheme a data directory uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Flat,
    Leveled,
}

/// A finalized table file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFile {
    pub generation: u32,
    pub level: usize,
    pub path: PathBuf,
}

/// Maps `(generation, level)` to paths inside one data directory.
#[derive(Debug, Clone)]
pub struct FileManager {
    dir: PathBuf,
    layout: Layout,
}

impl FileManager {
    /// Creates the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P, layout: Layout) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        Ok(Self { dir, layout })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    fn stem(&self, generation: u32, level: usize) -> String {
        match self.layout {
            Layout::Flat => generation.to_string(),
            Layout::Leveled => format!("{}_{}", generation, level),
        }
    }

    /// Final path of a table. `level` is ignored by the flat layout.
    pub fn table_path(&self, generation: u32, level: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.stem(generation, level), TABLE_EXT))
    }

    /// Path a table is written to before being renamed into place.
    pub fn temp_path(&self, generation: u32, level: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.stem(generation, level), TMP_EXT))
    }

    /// Parses `(generation, level)` out of a finalized table file name.
    pub fn parse(&self, file_name: &str) -> Option<(u32, usize)> {
        let stem = file_name.strip_suffix(".db")?;
        match self.layout {
            Layout::Flat => Some((stem.parse().ok()?, 0)),
            Layout::Leveled => {
                let (generation, level) = stem.split_once('_')?;
                Some((generation.parse().ok()?, level.parse().ok()?))
            }
        }
    }

    /// Lists finalized table files, sorted by generation.
    ///
    /// Leftover `.tmp` files come from a crash mid-write; they are deleted.
    /// Names that do not parse are logged and skipped.
    pub fn scan(&self) -> Result<Vec<TableFile>> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.extension().is_some_and(|e| e == TMP_EXT) {
                warn!(path = %path.display(), "removing leftover temp file");
                if let Err(e) = std::fs::remove_file(&path) {
                    error!(path = %path.display(), error = %e, "failed to remove temp file");
                }
                continue;
            }
            match self.parse(name) {
                Some((generation, level)) => files.push(TableFile {
                    generation,
                    level,
                    path,
                }),
                None => warn!(path = %path.display(), "skipping unrecognised file"),
            }
        }

        files.sort_by_key(|f| (f.generation, f.level));
        Ok(files)
    }

    /// Deletes a table file; failures are logged.
    pub fn remove(&self, generation: u32, level: usize) {
        let path = self.table_path(generation, level);
        if let Err(e) = std::fs::remove_file(&path) {
            error!(path = %path.display(), error = %e, "failed to delete table file");
        }
    }
}
