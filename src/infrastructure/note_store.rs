//! Local SQLite note store.
//!
//! Implements the [`NoteStore`] port for imports and serves notes back to
//! the export commands.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{
    AppError, AttachmentRef, Folder, FolderId, Note, NoteId, NoteStore, ParsedNote, Result,
};

/// Note repository using SQLite.
pub struct SqliteNoteStore {
    conn: Connection,
    attachments_dir: PathBuf,
}

/// An attachment row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub stored_path: PathBuf,
}

impl SqliteNoteStore {
    /// Opens or creates the note database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path, attachments_dir: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create storage directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::database)?;

        Self::with_connection(conn, attachments_dir)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    /// Returns error if schema creation fails.
    pub fn open_in_memory(attachments_dir: &Path) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::database)?;
        Self::with_connection(conn, attachments_dir)
    }

    fn with_connection(conn: Connection, attachments_dir: &Path) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(AppError::database)?;

        let store = Self {
            conn,
            attachments_dir: attachments_dir.to_path_buf(),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS note_tags (
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (note_id, tag)
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent_id INTEGER REFERENCES folders(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS note_folders (
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
                PRIMARY KEY (note_id, folder_id)
            );

            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_path TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notes_updated
                ON notes(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_folders_parent
                ON folders(parent_id);
            CREATE INDEX IF NOT EXISTS idx_attachments_note
                ON attachments(note_id);
            ",
            )
            .map_err(AppError::database)?;

        Ok(())
    }

    /// Most recently updated notes first.
    pub fn list_notes(&self, limit: usize) -> Result<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(
                r"
            SELECT id, title, body, created_at, updated_at
            FROM notes
            ORDER BY updated_at DESC, id DESC
            LIMIT ?1
            ",
            )
            .map_err(AppError::database)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit], Self::row_to_note)
            .map_err(AppError::database)?;

        let mut notes = Vec::new();
        for row in rows {
            let mut note = row.map_err(AppError::database)?;
            note.tags = self.get_tags(note.id)?;
            notes.push(note);
        }

        Ok(notes)
    }

    /// Fetch notes by id, in the order given. Unknown ids are skipped.
    pub fn get_notes(&self, ids: &[NoteId]) -> Result<Vec<Note>> {
        let mut notes = Vec::with_capacity(ids.len());
        for id in ids {
            let note = self
                .conn
                .query_row(
                    "SELECT id, title, body, created_at, updated_at FROM notes WHERE id = ?1",
                    [id.0],
                    Self::row_to_note,
                )
                .optional()
                .map_err(AppError::database)?;

            match note {
                Some(mut note) => {
                    note.tags = self.get_tags(note.id)?;
                    notes.push(note);
                }
                None => tracing::warn!(note_id = %id, "Note not found, skipping"),
            }
        }
        Ok(notes)
    }

    /// Convert a row to a Note (without tags).
    fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
        let created_at: String = row.get(3)?;
        let updated_at: String = row.get(4)?;

        Ok(Note {
            id: NoteId(row.get(0)?),
            title: row.get(1)?,
            body: row.get(2)?,
            tags: BTreeSet::new(),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn get_tags(&self, id: NoteId) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM note_tags WHERE note_id = ?1")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([id.0], |row| row.get::<_, String>(0))
            .map_err(AppError::database)?;

        rows.collect::<rusqlite::Result<BTreeSet<_>>>()
            .map_err(AppError::database)
    }

    /// Get note count.
    pub fn count_notes(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get::<_, i64>(0))
            .map(|c| usize::try_from(c).unwrap_or_default())
            .map_err(AppError::database)
    }

    /// All folders, parents before children.
    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, parent_id FROM folders ORDER BY id")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Folder {
                    id: FolderId(row.get(0)?),
                    name: row.get(1)?,
                    parent: row.get::<_, Option<i64>>(2)?.map(FolderId),
                })
            })
            .map_err(AppError::database)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)
    }

    /// Folders a note is filed under.
    pub fn folders_of(&self, note: NoteId) -> Result<Vec<FolderId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT folder_id FROM note_folders WHERE note_id = ?1 ORDER BY folder_id")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([note.0], |row| row.get::<_, i64>(0))
            .map_err(AppError::database)?;

        rows.map(|r| r.map(FolderId))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)
    }

    /// Attachments linked to a note.
    pub fn attachments_of(&self, note: NoteId) -> Result<Vec<StoredAttachment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT filename, mime_type, size_bytes, stored_path FROM attachments
                 WHERE note_id = ?1 ORDER BY id",
            )
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([note.0], |row| {
                Ok(StoredAttachment {
                    filename: row.get(0)?,
                    mime_type: row.get(1)?,
                    size_bytes: u64::try_from(row.get::<_, i64>(2)?).unwrap_or_default(),
                    stored_path: PathBuf::from(row.get::<_, String>(3)?),
                })
            })
            .map_err(AppError::database)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)
    }
}

impl NoteStore for SqliteNoteStore {
    fn save_note(&self, note: &ParsedNote) -> Result<NoteId> {
        let created_at = note.created_at.unwrap_or_else(Utc::now);
        let updated_at = note.updated_at.unwrap_or(created_at);

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(AppError::database)?;

        tx.execute(
            "INSERT INTO notes (title, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &note.title,
                &note.body,
                created_at.to_rfc3339(),
                updated_at.to_rfc3339(),
            ],
        )
        .map_err(AppError::database)?;
        let id = tx.last_insert_rowid();

        for tag in &note.tags {
            tx.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )
            .map_err(AppError::database)?;
        }

        tx.commit().map_err(AppError::database)?;

        Ok(NoteId(id))
    }

    fn create_folder(&self, name: &str, parent: Option<FolderId>) -> Result<FolderId> {
        self.conn
            .execute(
                "INSERT INTO folders (name, parent_id) VALUES (?1, ?2)",
                params![name, parent.map(|p| p.0)],
            )
            .map_err(AppError::database)?;

        Ok(FolderId(self.conn.last_insert_rowid()))
    }

    fn add_note_to_folder(&self, note: NoteId, folder: FolderId) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO note_folders (note_id, folder_id) VALUES (?1, ?2)",
                params![note.0, folder.0],
            )
            .map_err(AppError::database)?;

        Ok(())
    }

    fn attach_file(&self, note: NoteId, attachment: &AttachmentRef) -> Result<()> {
        let note_dir = self.attachments_dir.join(note.0.to_string());
        fs::create_dir_all(&note_dir)
            .map_err(|e| AppError::io("Failed to create attachment directory", e))?;

        let dest = unique_path(&note_dir, &attachment.suggested_filename);
        let size = fs::copy(&attachment.source_path, &dest).map_err(|e| {
            AppError::io(
                format!("Failed to copy attachment {}", attachment.source_path.display()),
                e,
            )
        })?;

        self.conn
            .execute(
                r"
            INSERT INTO attachments (note_id, filename, mime_type, size_bytes, stored_path)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
                params![
                    note.0,
                    &attachment.suggested_filename,
                    &attachment.mime_type,
                    i64::try_from(size).unwrap_or(i64::MAX),
                    dest.to_string_lossy().to_string(),
                ],
            )
            .map_err(AppError::database)?;

        tracing::debug!(note_id = %note, file = %dest.display(), "Stored attachment");

        Ok(())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// `dir/name`, or `dir/stem_2.ext`, `dir/stem_3.ext`, ... if taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let name = Path::new(name)
        .file_name()
        .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().to_string());
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map_or_else(|| name.clone(), |s| s.to_string_lossy().to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    (2u32..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem}_{n}.{ext}")),
            None => dir.join(format!("{stem}_{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
