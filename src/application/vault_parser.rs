//! Obsidian vault scanner.
//!
//! Walks a vault directory, mapping each directory to a folder and each
//! `.md` file to a note. Non-markdown files become attachments only when a
//! note links to them. Symlinks are followed; a link back to an ancestor is
//! reported once and its subtree skipped.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use walkdir::{DirEntry, WalkDir};

use crate::domain::{AttachmentRef, ImportError, ImportErrorCode, ParsedNote};

/// Walk settings.
#[derive(Debug, Clone, Copy)]
pub struct VaultOptions {
    pub skip_hidden: bool,
    pub max_depth: usize,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            max_depth: 64,
        }
    }
}

/// A directory of the vault. Index 0 is the vault root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFolder {
    /// Path relative to the vault root (empty for the root).
    pub rel_path: PathBuf,
    pub name: String,
    /// Index of the parent folder in `VaultScan::folders`.
    pub parent: Option<usize>,
}

/// A parsed note and the folder it belongs to.
#[derive(Debug, Clone)]
pub struct VaultNote {
    pub rel_path: PathBuf,
    /// Index into `VaultScan::folders`.
    pub folder: usize,
    pub note: ParsedNote,
}

/// Everything found in a vault. Folders are ordered parents first.
#[derive(Debug, Default)]
pub struct VaultScan {
    pub folders: Vec<VaultFolder>,
    pub notes: Vec<Result<VaultNote, ImportError>>,
    /// Walk failures: symlink cycles, unreadable entries and directories
    /// cut off by the depth limit.
    pub errors: Vec<ImportError>,
}

struct LinkPatterns {
    markdown: Regex,
    wiki: Regex,
}

impl LinkPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            markdown: Regex::new(r#"!?\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)?,
            wiki: Regex::new(r"!?\[\[([^\]|#^]+)(?:[#^|][^\]]*)?\]\]")?,
        })
    }
}

/// Scans a vault rooted at `root`.
///
/// # Errors
/// Returns an error only if `root` itself is unusable; everything below it
/// is reported through `VaultScan::errors` and per-note results.
pub fn scan_vault(root: &Path, options: VaultOptions) -> Result<VaultScan, ImportError> {
    let source = root.display().to_string();
    let canonical_root = fs::canonicalize(root).map_err(|e| ImportError::io(&source, &e))?;
    if !canonical_root.is_dir() {
        return Err(ImportError::parse(source, "vault path is not a directory"));
    }
    let patterns =
        LinkPatterns::new().map_err(|e| ImportError::parse(&source, e.to_string()))?;

    let mut scan = VaultScan::default();
    let mut folder_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut markdown_files: Vec<PathBuf> = Vec::new();
    let mut files_by_name: HashMap<String, PathBuf> = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(options.skip_hidden && e.depth() > 0 && is_hidden(e)));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                scan.errors.push(walk_error(root, &err));
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if entry.depth() == options.max_depth
                && has_visible_children(path, options.skip_hidden)
            {
                scan.errors.push(ImportError::new(
                    relative(root, path).display().to_string(),
                    format!(
                        "directory is nested deeper than {} levels; its contents were skipped",
                        options.max_depth
                    ),
                    ImportErrorCode::DepthLimit,
                ));
            }
            let parent = path.parent().and_then(|p| folder_index.get(p)).copied();
            let name = if entry.depth() == 0 {
                vault_name(root, &canonical_root)
            } else {
                entry.file_name().to_string_lossy().to_string()
            };
            folder_index.insert(path.to_path_buf(), scan.folders.len());
            scan.folders.push(VaultFolder {
                rel_path: relative(root, path),
                name,
                parent: if entry.depth() == 0 { None } else { parent },
            });
        } else if is_markdown(path) {
            markdown_files.push(path.to_path_buf());
        } else {
            let key = entry.file_name().to_string_lossy().to_lowercase();
            files_by_name.entry(key).or_insert_with(|| path.to_path_buf());
        }
    }

    tracing::debug!(
        vault = %source,
        folders = scan.folders.len(),
        notes = markdown_files.len(),
        "Discovered vault contents"
    );

    let resolver = AttachmentResolver {
        root,
        canonical_root: &canonical_root,
        files_by_name: &files_by_name,
        patterns: &patterns,
    };

    for path in markdown_files {
        let folder = path
            .parent()
            .and_then(|p| folder_index.get(p))
            .copied()
            .unwrap_or(0);
        scan.notes
            .push(read_vault_note(root, &path, &resolver).map(|note| VaultNote {
                rel_path: relative(root, &path),
                folder,
                note,
            }));
    }

    Ok(scan)
}

fn walk_error(root: &Path, err: &walkdir::Error) -> ImportError {
    let location = err
        .path()
        .map_or_else(|| root.display().to_string(), |p| relative(root, p).display().to_string());

    match err.loop_ancestor() {
        Some(ancestor) => ImportError::new(
            location,
            format!(
                "symlink cycle: points back to ancestor {}",
                ancestor.display()
            ),
            ImportErrorCode::SymlinkCycle,
        ),
        None => ImportError::new(location, err.to_string(), ImportErrorCode::IoError),
    }
}

fn read_vault_note(
    root: &Path,
    path: &Path,
    resolver: &AttachmentResolver<'_>,
) -> Result<ParsedNote, ImportError> {
    let source = relative(root, path).display().to_string();
    let bytes = fs::read(path).map_err(|e| ImportError::io(&source, &e))?;
    let body = String::from_utf8(bytes)
        .map_err(|e| ImportError::parse(&source, format!("file is not valid UTF-8: {e}")))?;

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let metadata = fs::metadata(path).ok();
    let created_at = metadata
        .as_ref()
        .and_then(|m| m.created().ok())
        .map(DateTime::<Utc>::from);
    let updated_at = metadata
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    let note_dir = path.parent().unwrap_or(root);
    let attachments = resolver.resolve(&body, note_dir);

    Ok(ParsedNote {
        title,
        body,
        tags: Default::default(),
        created_at,
        updated_at,
        attachments,
    })
}

struct AttachmentResolver<'a> {
    root: &'a Path,
    canonical_root: &'a Path,
    files_by_name: &'a HashMap<String, PathBuf>,
    patterns: &'a LinkPatterns,
}

impl AttachmentResolver<'_> {
    /// Attachments referenced from `body`, in order of first reference.
    fn resolve(&self, body: &str, note_dir: &Path) -> Vec<AttachmentRef> {
        let mut seen = HashSet::new();
        let mut attachments = Vec::new();

        let markdown_targets = self
            .patterns
            .markdown
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| (m.start(), m.as_str(), false));
        let wiki_targets = self
            .patterns
            .wiki
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| (m.start(), m.as_str(), true));

        let mut targets: Vec<_> = markdown_targets.chain(wiki_targets).collect();
        targets.sort_by_key(|(start, _, _)| *start);

        for (_, target, is_wiki) in targets {
            let Some(path) = self.locate(target.trim(), note_dir, is_wiki) else {
                continue;
            };
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(attachment) = attachment_for(&path) {
                attachments.push(attachment);
            }
        }

        attachments
    }

    /// Resolve a link target to a canonical file inside the vault.
    fn locate(&self, target: &str, note_dir: &Path, is_wiki: bool) -> Option<PathBuf> {
        if target.is_empty() || target.starts_with('#') || target.contains("://") || target.starts_with("mailto:") {
            return None;
        }
        let target = target.replace("%20", " ");

        let candidate = if let Some(abs) = target.strip_prefix('/') {
            self.root.join(abs)
        } else if is_wiki && target.contains('/') {
            self.root.join(&target)
        } else {
            note_dir.join(&target)
        };

        let found = if candidate.is_file() {
            Some(candidate)
        } else if is_wiki && !target.contains('/') {
            self.files_by_name.get(&target.to_lowercase()).cloned()
        } else {
            None
        }?;

        let canonical = fs::canonicalize(found).ok()?;
        (canonical.starts_with(self.canonical_root) && !is_markdown(&canonical))
            .then_some(canonical)
    }
}

fn attachment_for(path: &Path) -> Option<AttachmentRef> {
    let metadata = fs::metadata(path).ok()?;
    Some(AttachmentRef {
        source_path: path.to_path_buf(),
        suggested_filename: path.file_name()?.to_string_lossy().to_string(),
        mime_type: mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        size_bytes: metadata.len(),
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Whether the walk would have visited anything inside `dir`.
fn has_visible_children(dir: &Path, skip_hidden: bool) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| {
        entries.any(|e| {
            e.is_ok_and(|e| !(skip_hidden && e.file_name().to_string_lossy().starts_with('.')))
        })
    })
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn vault_name(root: &Path, canonical_root: &Path) -> String {
    root.file_name()
        .or_else(|| canonical_root.file_name())
        .map_or_else(|| "vault".to_string(), |n| n.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn ok_notes(scan: &VaultScan) -> Vec<&VaultNote> {
        scan.notes.iter().filter_map(|n| n.as_ref().ok()).collect()
    }

    #[test]
    fn test_maps_directories_to_nested_folders() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("MyVault");
        write(&vault.join("Inbox.md"), "root note");
        write(&vault.join("Projects/Alpha.md"), "alpha [[Beta]]");
        write(&vault.join("Projects/Archive/Old.md"), "old");

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();

        let names: Vec<_> = scan.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["MyVault", "Projects", "Archive"]);
        assert_eq!(scan.folders[0].parent, None);
        assert_eq!(scan.folders[1].parent, Some(0));
        assert_eq!(scan.folders[2].parent, Some(1));

        let notes = ok_notes(&scan);
        assert_eq!(notes.len(), 3);
        let alpha = notes.iter().find(|n| n.note.title == "Alpha").unwrap();
        assert_eq!(alpha.folder, 1);
        assert_eq!(alpha.note.body, "alpha [[Beta]]");
        let old = notes.iter().find(|n| n.note.title == "Old").unwrap();
        assert_eq!(old.folder, 2);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn test_referenced_files_become_attachments() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("v");
        write(&vault.join("assets/diagram.png"), "png");
        write(&vault.join("assets/unused.pdf"), "pdf");
        write(&vault.join("Files/report final.pdf"), "report");
        write(
            &vault.join("notes/Note.md"),
            "See ![d](../assets/diagram.png) and ![[report final.pdf]] and [web](https://x.io/a.png) and [[Other note]]",
        );

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();
        let notes = ok_notes(&scan);
        let attachments = &notes[0].note.attachments;

        let names: Vec<_> = attachments
            .iter()
            .map(|a| a.suggested_filename.as_str())
            .collect();
        assert_eq!(names, vec!["diagram.png", "report final.pdf"]);
        assert_eq!(attachments[0].mime_type, "image/png");
        assert_eq!(attachments[0].size_bytes, 3);
        assert_eq!(attachments[1].mime_type, "application/pdf");
    }

    #[test]
    fn test_links_outside_vault_ignored() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("secret.txt"), "nope");
        let vault = dir.path().join("v");
        write(&vault.join("a.md"), "[x](../secret.txt)");

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();
        assert!(ok_notes(&scan)[0].note.attachments.is_empty());
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("v");
        write(&vault.join(".obsidian/workspace.md"), "cfg");
        write(&vault.join("visible.md"), "x");

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();
        assert_eq!(scan.folders.len(), 1);
        assert_eq!(ok_notes(&scan).len(), 1);

        let all = scan_vault(
            &vault,
            VaultOptions {
                skip_hidden: false,
                ..VaultOptions::default()
            },
        )
        .unwrap();
        assert_eq!(all.folders.len(), 2);
        assert_eq!(ok_notes(&all).len(), 2);
    }

    #[test]
    fn test_invalid_utf8_note_is_scoped_error() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("v");
        write(&vault.join("good.md"), "fine");
        fs::write(vault.join("bad.md"), [0xff, 0xfe]).unwrap();

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();
        assert_eq!(scan.notes.len(), 2);
        let err = scan.notes.iter().find_map(|n| n.as_ref().err()).unwrap();
        assert_eq!(err.source, "bad.md");
        assert_eq!(err.code, ImportErrorCode::ParseError);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates_with_one_error() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("v");
        write(&vault.join("sub/note.md"), "inside");
        std::os::unix::fs::symlink(&vault, vault.join("sub/loop")).unwrap();

        let scan = scan_vault(&vault, VaultOptions::default()).unwrap();

        let cycles: Vec<_> = scan
            .errors
            .iter()
            .filter(|e| e.code == ImportErrorCode::SymlinkCycle)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].source, Path::new("sub").join("loop").display().to_string());
        assert_eq!(ok_notes(&scan).len(), 1);
    }

    #[test]
    fn test_depth_limit_reports_cut_off_directories() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("v");
        write(&vault.join("top.md"), "top");
        write(&vault.join("a/b/deep.md"), "deep");
        write(&vault.join("c/.hidden/skip.md"), "hidden");
        fs::create_dir_all(vault.join("empty")).unwrap();

        let scan = scan_vault(
            &vault,
            VaultOptions {
                max_depth: 1,
                ..VaultOptions::default()
            },
        )
        .unwrap();

        assert_eq!(ok_notes(&scan).len(), 1);
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].code, ImportErrorCode::DepthLimit);
        assert_eq!(scan.errors[0].source, "a");
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempdir().unwrap();
        let err = scan_vault(&dir.path().join("nope"), VaultOptions::default()).unwrap_err();
        assert_eq!(err.code, ImportErrorCode::IoError);
    }
}
