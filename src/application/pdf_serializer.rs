//! PDF serializer.
//!
//! Loads the body font (possibly over the network), renders on the blocking
//! pool and writes the file. Font failures are reported as network or
//! render errors so callers can tell whether a Markdown retry makes sense.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ExportFormat, FileHandle, Note, SerializeError};
use crate::infrastructure::{ExportTarget, FontError, FontSource, StandardFonts};

use super::pdf_writer::{render_pdf, PdfContent};
use super::serializer::NoteSerializer;

/// Renders notes as paginated PDF documents.
pub struct PdfSerializer {
    fonts: Arc<dyn FontSource>,
}

impl PdfSerializer {
    #[must_use]
    pub fn new(fonts: Arc<dyn FontSource>) -> Self {
        Self { fonts }
    }
}

impl Default for PdfSerializer {
    fn default() -> Self {
        Self::new(Arc::new(StandardFonts))
    }
}

impl From<FontError> for SerializeError {
    fn from(err: FontError) -> Self {
        match err {
            FontError::Network(message) => Self::Network { message },
            FontError::Invalid(message) => Self::Render { message },
        }
    }
}

#[async_trait]
impl NoteSerializer for PdfSerializer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    async fn serialize_with_progress(
        &self,
        note: &Note,
        target: &ExportTarget,
        on_step: &mut (dyn FnMut(&str) + Send),
    ) -> Result<FileHandle, SerializeError> {
        on_step("loading fonts");
        let font = self.fonts.load().await?;

        on_step("rendering");
        let title = note.display_title();
        let body = note.body.clone();
        let modified = note.updated_at;
        let bytes = tokio::task::spawn_blocking(move || {
            render_pdf(
                &PdfContent {
                    title: &title,
                    body: &body,
                    modified,
                },
                &font,
            )
        })
        .await
        .map_err(|e| SerializeError::render(format!("PDF renderer stopped: {e}")))?;

        tracing::debug!(note = %note.id, bytes = bytes.len(), "Rendered PDF");

        on_step("writing");
        target
            .write(&note.title, ExportFormat::Pdf.extension(), &bytes)
            .map_err(SerializeError::write)
    }
}
