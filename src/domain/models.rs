//! Domain models for notes moving through the import/export pipeline.
//!
//! `ParsedNote` is what a parser produces; `Note` is what the store hands
//! back for export.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the note store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a folder in the note store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub i64);

/// A file a parsed note refers to, staged somewhere readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Where the bytes can be read from right now.
    pub source_path: PathBuf,
    /// File name to use once the attachment is stored.
    pub suggested_filename: String,
    /// MIME type, `application/octet-stream` when unknown.
    pub mime_type: String,
    /// Size of the staged file.
    pub size_bytes: u64,
}

/// Intermediate note produced by a format parser.
///
/// Consumed once by the import orchestrator, which persists it and drops it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNote {
    /// Note title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Tags, deduplicated and sorted.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation time, if the source carried one.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time, if the source carried one.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Attachments in document order.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ParsedNote {
    /// Create a note with title and body only.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }
}

/// A stored note as handed to the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store identifier.
    pub id: NoteId,
    /// Note title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Tags, sorted.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// When the note was created.
    pub created_at: DateTime<Utc>,
    /// When the note was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Title to show in reports, falling back to the id for untitled notes.
    ///
    /// Titles imported from Markdown keep a byte order mark or `\r` from the
    /// source file; both are dropped here.
    #[must_use]
    pub fn display_title(&self) -> String {
        let title = self.title.trim_start_matches('\u{feff}').trim();
        if title.is_empty() {
            format!("note {}", self.id)
        } else {
            title.to_string()
        }
    }
}

/// A folder as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Store identifier.
    pub id: FolderId,
    /// Folder name (directory name for vault imports).
    pub name: String,
    /// Parent folder, `None` at the top level.
    pub parent: Option<FolderId>,
}

/// Path written by an export serializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    /// Absolute or output-relative path of the artifact.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}
