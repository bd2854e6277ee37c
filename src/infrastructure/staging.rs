//! Temporary staging area for attachment bytes decoded during an import.
//!
//! Files live until the `StagingArea` is dropped, which happens after the
//! import run has copied them into the note store.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::domain::{AppError, Result};

/// Scratch directory for one import run.
pub struct StagingArea {
    dir: TempDir,
    used: Mutex<HashSet<String>>,
}

impl StagingArea {
    /// Create a fresh staging directory under the system temp dir.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("note-porter-staging-")
            .tempdir()
            .map_err(|e| AppError::io("Failed to create staging directory", e))?;

        Ok(Self {
            dir,
            used: Mutex::new(HashSet::new()),
        })
    }

    /// Root of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` under a name derived from `filename`, unique within
    /// this area.
    ///
    /// # Errors
    /// Returns the IO error if the write fails.
    pub fn stage(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let name = self.reserve(filename);
        let path = self.dir.path().join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    fn reserve(&self, filename: &str) -> String {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "attachment".to_string());

        let mut used = self
            .used
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if used.insert(base.clone()) {
            return base;
        }

        let mut n = 2u32;
        loop {
            let candidate = format!("{n}-{base}");
            if used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
