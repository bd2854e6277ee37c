//! Export serializer contract and the Markdown serializer.

use async_trait::async_trait;

use crate::domain::{ExportFormat, FileHandle, Note, SerializeError};
use crate::infrastructure::ExportTarget;

/// Turns one stored note into an artifact inside an `ExportTarget`.
#[async_trait]
pub trait NoteSerializer: Send + Sync {
    /// Format this serializer produces.
    fn format(&self) -> ExportFormat;

    /// Serialize `note`, reporting named sub-steps through `on_step`.
    async fn serialize_with_progress(
        &self,
        note: &Note,
        target: &ExportTarget,
        on_step: &mut (dyn FnMut(&str) + Send),
    ) -> Result<FileHandle, SerializeError>;

    /// Serialize without progress reporting.
    async fn serialize(&self, note: &Note, target: &ExportTarget) -> Result<FileHandle, SerializeError> {
        self.serialize_with_progress(note, target, &mut |_: &str| {}).await
    }
}

/// Writes the title as the first line followed by the body verbatim.
///
/// Reading the file back with the Markdown parser gives the same title and
/// body, provided the title carries no heading or list markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownSerializer;

impl MarkdownSerializer {
    /// The Markdown text for `note`.
    #[must_use]
    pub fn render(note: &Note) -> String {
        if note.title.is_empty() && note.body.is_empty() {
            return String::new();
        }
        format!("{}\n{}", note.title, note.body)
    }
}

#[async_trait]
impl NoteSerializer for MarkdownSerializer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    async fn serialize_with_progress(
        &self,
        note: &Note,
        target: &ExportTarget,
        on_step: &mut (dyn FnMut(&str) + Send),
    ) -> Result<FileHandle, SerializeError> {
        on_step("writing");
        target
            .write(&note.title, ExportFormat::Markdown.extension(), Self::render(note).as_bytes())
            .map_err(SerializeError::write)
    }
}
