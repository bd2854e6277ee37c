//! Output directory for exported artifacts.
//!
//! File names are derived from note titles deterministically and never
//! overwrite an existing file: collisions get `_2`, `_3`, ... suffixes.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::domain::{AppError, FileHandle, Result};

const MAX_STEM_CHARS: usize = 50;
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Directory that export serializers write into.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    dir: PathBuf,
}

impl ExportTarget {
    /// Use `dir` as output directory, creating it if missing.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::io(format!("Failed to create directory {}", dir.display()), e)
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an artifact for a note titled `title`.
    ///
    /// # Errors
    /// Returns the IO error from creating or writing the file. A file that
    /// fails mid-write is removed again.
    pub fn write(&self, title: &str, extension: &str, bytes: &[u8]) -> std::io::Result<FileHandle> {
        self.write_with(title, extension, |file| {
            file.write_all(bytes)?;
            file.flush()?;
            Ok(bytes.len() as u64)
        })
    }

    fn write_with(
        &self,
        title: &str,
        extension: &str,
        fill: impl FnOnce(&mut File) -> std::io::Result<u64>,
    ) -> std::io::Result<FileHandle> {
        let (mut file, path) = self.claim(&file_stem_for_title(title), extension)?;

        match fill(&mut file) {
            Ok(size) => Ok(FileHandle { path, size }),
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        "Failed to remove partial export: {cleanup}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Create the first free `stem[_n].extension` in the directory.
    fn claim(&self, stem: &str, extension: &str) -> std::io::Result<(File, PathBuf)> {
        for n in 1..=MAX_COLLISION_SUFFIX {
            let name = if n == 1 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}_{n}.{extension}")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {stem}.{extension}"),
        ))
    }
}

/// Safe file stem for a note title: lowercase words joined by `_`.
#[must_use]
pub fn file_stem_for_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut stem = String::new();
    for word in cleaned.split_whitespace() {
        let extra = word.chars().count() + usize::from(!stem.is_empty());
        if stem.chars().count() + extra > MAX_STEM_CHARS {
            if stem.is_empty() {
                stem = word.chars().take(MAX_STEM_CHARS).collect();
            }
            break;
        }
        if !stem.is_empty() {
            stem.push('_');
        }
        stem.push_str(word);
    }

    let stem = stem.to_lowercase();
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}
