//! Storage port consumed by the import pipeline.

use super::error::Result;
use super::models::{AttachmentRef, FolderId, NoteId, ParsedNote};

/// Destination note store.
///
/// Callers must not run two pipeline batches against the same store at once;
/// within a batch every write happens sequentially.
pub trait NoteStore {
    /// Persist a parsed note and return its new id.
    fn save_note(&self, note: &ParsedNote) -> Result<NoteId>;

    /// Create a folder under `parent` (top level when `None`).
    fn create_folder(&self, name: &str, parent: Option<FolderId>) -> Result<FolderId>;

    /// File a note under a folder.
    fn add_note_to_folder(&self, note: NoteId, folder: FolderId) -> Result<()>;

    /// Copy an attachment's bytes into the store and link it to `note`.
    fn attach_file(&self, note: NoteId, attachment: &AttachmentRef) -> Result<()>;
}
