//! Import orchestration.
//!
//! Inputs are processed one after another. Each input produces exactly one
//! `ImportResult`; parse and persist failures are collected into it and
//! never stop the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::domain::{
    FolderId, ImportConfig, ImportError, ImportErrorCode, ImportProgress, ImportResult, NoteStore,
    ParsedNote, Phase,
};
use crate::infrastructure::StagingArea;

use super::enex_parser::parse_enex;
use super::markdown_parser::parse_markdown;
use super::vault_parser::{scan_vault, VaultOptions};

/// Progress sink for import runs.
pub type ImportProgressFn<'a> = dyn FnMut(&ImportProgress) + 'a;

/// One input of an import batch, classified by format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRef {
    /// A single Markdown (or plain text) file.
    Markdown(PathBuf),
    /// An Evernote `.enex` archive.
    Enex(PathBuf),
    /// An Obsidian vault directory.
    Vault(PathBuf),
    /// Anything else; reported as `UNSUPPORTED_INPUT`.
    Unsupported(PathBuf),
}

impl InputRef {
    /// Classify `path`: directories are vaults, files go by extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            return Self::Vault(path);
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "enex" => Self::Enex(path),
            "md" | "markdown" | "txt" => Self::Markdown(path),
            _ => Self::Unsupported(path),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Markdown(p) | Self::Enex(p) | Self::Vault(p) | Self::Unsupported(p) => p,
        }
    }

    /// Name used in progress and reports: the file or directory name.
    #[must_use]
    pub fn name(&self) -> String {
        let path = self.path();
        path.file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
    }
}

/// Drives parsers over a batch of inputs and persists the notes.
pub struct ImportService<'a, S: NoteStore + ?Sized> {
    store: &'a S,
    vault: VaultOptions,
}

impl<'a, S: NoteStore + ?Sized> ImportService<'a, S> {
    pub fn new(store: &'a S, config: &ImportConfig) -> Self {
        Self {
            store,
            vault: VaultOptions {
                skip_hidden: config.skip_hidden,
                max_depth: config.max_vault_depth,
            },
        }
    }

    /// Import every input in order, returning one result per input.
    pub fn run(
        &self,
        inputs: &[InputRef],
        on_progress: &mut ImportProgressFn<'_>,
    ) -> Vec<ImportResult> {
        let total = u32::try_from(inputs.len()).unwrap_or(u32::MAX);
        let mut staging: Option<StagingArea> = None;
        let mut results = Vec::with_capacity(inputs.len());

        on_progress(&ImportProgress::new(Phase::Discovering, "", 0, total));

        for (index, input) in inputs.iter().enumerate() {
            let current = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let name = input.name();
            let started = Instant::now();

            on_progress(&ImportProgress::new(Phase::Parsing, &name, current, total));

            let mut batch = Batch {
                store: self.store,
                result: ImportResult::new(&name),
                on_progress: &mut *on_progress,
                current,
                total,
            };

            match input {
                InputRef::Markdown(path) => batch.import_markdown(path),
                InputRef::Enex(path) => batch.import_enex(path, &mut staging),
                InputRef::Vault(path) => batch.import_vault(path, self.vault),
                InputRef::Unsupported(path) => batch.result.errors.push(ImportError::new(
                    &name,
                    format!("unsupported input: {}", path.display()),
                    ImportErrorCode::UnsupportedInput,
                )),
            }

            let mut result = batch.result;
            result.duration = started.elapsed();

            tracing::info!(
                source = %result.source,
                imported = result.success_count,
                errors = result.errors.len(),
                duration_ms = result.duration.as_millis(),
                "Imported input"
            );
            for error in &result.errors {
                tracing::warn!(code = %error.code, "{}: {}", error.source, error.message);
            }

            results.push(result);
        }

        on_progress(&ImportProgress::new(Phase::Finishing, "", total, total));
        results
    }
}

/// Per-input state: the result being built and the progress sink.
struct Batch<'s, 'p, 'f, S: NoteStore + ?Sized> {
    store: &'s S,
    result: ImportResult,
    on_progress: &'p mut ImportProgressFn<'f>,
    current: u32,
    total: u32,
}

impl<S: NoteStore + ?Sized> Batch<'_, '_, '_, S> {
    fn import_markdown(&mut self, path: &Path) {
        let name = self.result.source.clone();
        match fs::read(path) {
            Ok(bytes) => match parse_markdown(&name, &bytes) {
                Ok(note) => self.persist(&note, &name, None),
                Err(err) => self.result.errors.push(err),
            },
            Err(err) => self.result.errors.push(ImportError::io(&name, &err)),
        }
    }

    fn import_enex(&mut self, path: &Path, staging: &mut Option<StagingArea>) {
        let name = self.result.source.clone();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => return self.result.errors.push(ImportError::io(&name, &err)),
        };

        if staging.is_none() {
            match StagingArea::new() {
                Ok(area) => *staging = Some(area),
                Err(err) => {
                    return self.result.errors.push(ImportError::new(
                        &name,
                        err.to_string(),
                        ImportErrorCode::IoError,
                    ));
                }
            }
        }
        let Some(staging) = staging.as_ref() else {
            return;
        };

        match parse_enex(&name, &bytes, staging) {
            Ok(entries) => {
                for (i, entry) in entries.into_iter().enumerate() {
                    match entry {
                        Ok(note) => self.persist(&note, &format!("{name} (note {})", i + 1), None),
                        Err(err) => self.result.errors.push(err),
                    }
                }
            }
            Err(err) => self.result.errors.push(err),
        }
    }

    fn import_vault(&mut self, path: &Path, options: VaultOptions) {
        let name = self.result.source.clone();
        let scan = match scan_vault(path, options) {
            Ok(scan) => scan,
            Err(err) => return self.result.errors.push(err),
        };
        self.result.errors.extend(scan.errors);

        let mut folder_ids: Vec<Option<FolderId>> = Vec::with_capacity(scan.folders.len());
        for folder in &scan.folders {
            // A folder whose parent failed lands at the top level.
            let parent = folder
                .parent
                .and_then(|p| folder_ids.get(p).copied().flatten());
            let id = match self.store.create_folder(&folder.name, parent) {
                Ok(id) => Some(id),
                Err(err) => {
                    let source = format!("{name}/{}", folder.rel_path.display());
                    self.result.errors.push(ImportError::persist(source, &err));
                    None
                }
            };
            folder_ids.push(id);
        }

        for entry in scan.notes {
            match entry {
                Ok(vault_note) => {
                    let source = format!("{name}/{}", vault_note.rel_path.display());
                    let folder = folder_ids.get(vault_note.folder).copied().flatten();
                    self.persist(&vault_note.note, &source, folder);
                }
                Err(err) => self.result.errors.push(err),
            }
        }
    }

    /// Save one note with its attachments and folder membership.
    ///
    /// The note counts as imported once it is saved; attachment and folder
    /// failures are recorded separately.
    fn persist(&mut self, note: &ParsedNote, source: &str, folder: Option<FolderId>) {
        let title = note.title.trim_start_matches('\u{feff}').trim();
        (self.on_progress)(&ImportProgress::new(
            Phase::Writing,
            if title.is_empty() { source } else { title },
            self.current,
            self.total,
        ));

        let id = match self.store.save_note(note) {
            Ok(id) => id,
            Err(err) => return self.result.errors.push(ImportError::persist(source, &err)),
        };
        self.result.success_count += 1;

        for attachment in &note.attachments {
            if let Err(err) = self.store.attach_file(id, attachment) {
                let source = format!("{source}: {}", attachment.suggested_filename);
                self.result.errors.push(ImportError::persist(source, &err));
            }
        }

        if let Some(folder) = folder {
            if let Err(err) = self.store.add_note_to_folder(id, folder) {
                self.result.errors.push(ImportError::persist(source, &err));
            }
        }
    }
}
