//! Export orchestration.
//!
//! Notes are exported one at a time, in order. Every attempted note yields
//! exactly one `ExportResult`; serializer failures become `Failure` entries.
//! Cancellation is checked before each note starts, so a note already in
//! flight always finishes (or times out) and is reported.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    ExportConfig, ExportErrorCode, ExportFormat, ExportProgress, ExportResult, Note, Phase,
};
use crate::infrastructure::{ExportTarget, FontSource};

use super::html_serializer::HtmlSerializer;
use super::pdf_serializer::PdfSerializer;
use super::serializer::{MarkdownSerializer, NoteSerializer};

/// Progress sink for export runs.
pub type ExportProgressFn<'a> = dyn FnMut(&ExportProgress) + Send + 'a;

/// Drives serializers over a batch of notes.
pub struct ExportService {
    target: ExportTarget,
    serializers: HashMap<ExportFormat, Arc<dyn NoteSerializer>>,
    pdf_timeout: Duration,
}

impl ExportService {
    /// Service with the built-in Markdown, HTML and PDF serializers.
    #[must_use]
    pub fn new(target: ExportTarget, config: &ExportConfig, fonts: Arc<dyn FontSource>) -> Self {
        Self {
            target,
            serializers: HashMap::new(),
            pdf_timeout: config.pdf_timeout(),
        }
        .with_serializer(Arc::new(MarkdownSerializer))
        .with_serializer(Arc::new(HtmlSerializer))
        .with_serializer(Arc::new(PdfSerializer::new(fonts)))
    }

    /// Register `serializer` for its format, replacing any existing one.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn NoteSerializer>) -> Self {
        self.serializers.insert(serializer.format(), serializer);
        self
    }

    #[must_use]
    pub const fn target(&self) -> &ExportTarget {
        &self.target
    }

    /// Export `notes` as `format`.
    ///
    /// Returns one result per note attempted. If `cancel` fires, the notes
    /// not yet started are left out.
    pub async fn run(
        &self,
        notes: &[Note],
        format: ExportFormat,
        on_progress: &mut ExportProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Vec<ExportResult> {
        let total = u32::try_from(notes.len()).unwrap_or(u32::MAX);
        let mut results = Vec::with_capacity(notes.len());

        tracing::info!(notes = notes.len(), format = %format, "Starting export");

        for (index, note) in notes.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    completed = results.len(),
                    remaining = notes.len() - index,
                    "Export cancelled"
                );
                break;
            }

            let current = u32::try_from(index + 1).unwrap_or(u32::MAX);
            on_progress(&ExportProgress::new(
                Phase::Writing,
                format!("Exporting {}", note.display_title()),
                current,
                total,
            ));

            let result = self.export_one(note, format, current, total, on_progress).await;
            if let ExportResult::Failure {
                error, error_code, ..
            } = &result
            {
                tracing::warn!(note = %note.id, code = %error_code, "Export failed: {error}");
            }
            results.push(result);
        }

        on_progress(&ExportProgress::new(
            Phase::Finishing,
            "Export complete",
            u32::try_from(results.len()).unwrap_or(u32::MAX),
            total,
        ));

        results
    }

    /// Export again as Markdown every note whose result suggests it.
    ///
    /// `results` must be the output of `run` over the same `notes`.
    pub async fn retry_as_markdown(
        &self,
        notes: &[Note],
        results: &[ExportResult],
        on_progress: &mut ExportProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Vec<ExportResult> {
        let retry: Vec<Note> = notes
            .iter()
            .zip(results)
            .filter(|(_, result)| result.suggests_markdown_retry())
            .map(|(note, _)| note.clone())
            .collect();

        if retry.is_empty() {
            return Vec::new();
        }
        tracing::info!(notes = retry.len(), "Retrying failed PDF exports as Markdown");
        self.run(&retry, ExportFormat::Markdown, on_progress, cancel).await
    }

    async fn export_one(
        &self,
        note: &Note,
        format: ExportFormat,
        current: u32,
        total: u32,
        on_progress: &mut ExportProgressFn<'_>,
    ) -> ExportResult {
        let serializer = match self.serializers.get(&format) {
            Some(serializer) if format.is_implemented() => serializer,
            _ => {
                return failure(
                    note,
                    format,
                    ExportErrorCode::FormatNotImplemented,
                    format!("{} export is not implemented", format.display_name()),
                    Duration::ZERO,
                );
            }
        };

        let started = Instant::now();
        let mut on_step = |step: &str| {
            on_progress(&ExportProgress::new(Phase::Writing, step, current, total));
        };
        // A panicking serializer fails its own note, not the batch.
        let work =
            AssertUnwindSafe(serializer.serialize_with_progress(note, &self.target, &mut on_step))
                .catch_unwind();

        let outcome = if format == ExportFormat::Pdf {
            match tokio::time::timeout(self.pdf_timeout, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return failure(
                        note,
                        format,
                        ExportErrorCode::ExportTimeout,
                        format!(
                            "PDF export did not finish within {}s",
                            self.pdf_timeout.as_secs()
                        ),
                        self.pdf_timeout,
                    );
                }
            }
        } else {
            work.await
        };

        let processing_time = started.elapsed();
        match outcome {
            Ok(Ok(file)) => ExportResult::Success {
                file_size: file.size,
                file,
                processing_time,
                format,
            },
            Ok(Err(err)) => failure(note, format, err.code(), err.to_string(), processing_time),
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!(note = %note.id, "Serializer panicked: {message}");
                failure(
                    note,
                    format,
                    ExportErrorCode::RenderError,
                    format!("serializer panicked: {message}"),
                    processing_time,
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn failure(
    note: &Note,
    format: ExportFormat,
    error_code: ExportErrorCode,
    error: String,
    processing_time: Duration,
) -> ExportResult {
    ExportResult::Failure {
        source: note.display_title(),
        error,
        error_code,
        processing_time,
        format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::serializer::tests::note;
    use crate::domain::{FileHandle, SerializeError};
    use crate::infrastructure::StandardFonts;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    /// Serializer double: counts calls, fails notes titled "bad", panics on
    /// notes titled "panic", and optionally sleeps.
    struct FakeSerializer {
        format: ExportFormat,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeSerializer {
        fn new(format: ExportFormat) -> Arc<Self> {
            Self::slow(format, Duration::ZERO)
        }

        fn slow(format: ExportFormat, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                format,
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl NoteSerializer for FakeSerializer {
        fn format(&self) -> ExportFormat {
            self.format
        }

        async fn serialize_with_progress(
            &self,
            note: &Note,
            target: &ExportTarget,
            on_step: &mut (dyn FnMut(&str) + Send),
        ) -> Result<FileHandle, SerializeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            on_step("rendering");
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if note.title == "bad" {
                return Err(SerializeError::render("boom"));
            }
            if note.title == "panic" {
                panic!("render exploded");
            }
            Ok(FileHandle {
                path: target.dir().join(format!("{}.out", note.id)),
                size: note.body.len() as u64,
            })
        }
    }

    fn service(dir: &TempDir) -> ExportService {
        ExportService::new(
            ExportTarget::new(dir.path()).unwrap(),
            &ExportConfig::default(),
            Arc::new(StandardFonts),
        )
    }

    fn notes(n: i64) -> Vec<Note> {
        (1..=n).map(|i| note(i, &format!("Note {i}"), "body")).collect()
    }

    #[tokio::test]
    async fn test_empty_batch_invokes_no_serializer() {
        let dir = tempdir().unwrap();
        let fake = FakeSerializer::new(ExportFormat::Markdown);
        let svc = service(&dir).with_serializer(fake.clone());

        let results = svc
            .run(&[], ExportFormat::Markdown, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert!(results.is_empty());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_markdown_batch_writes_every_note() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let batch = notes(3);
        let mut seen = Vec::new();

        let results = svc
            .run(
                &batch,
                ExportFormat::Markdown,
                &mut |p: &ExportProgress| seen.push((p.phase, p.current, p.current_operation.clone())),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(ExportResult::is_success));
        assert_eq!(seen[0], (Phase::Writing, 1, "Exporting Note 1".to_string()));
        assert_eq!(seen[1], (Phase::Writing, 1, "writing".to_string()));
        assert_eq!(seen.last().unwrap().0, Phase::Finishing);
        assert!(dir.path().join("note_2.md").exists());
    }

    #[tokio::test]
    async fn test_cancel_during_third_note_keeps_three_results() {
        let dir = tempdir().unwrap();
        let fake = FakeSerializer::new(ExportFormat::Markdown);
        let svc = service(&dir).with_serializer(fake.clone());
        let token = CancellationToken::new();
        let trigger = token.clone();

        // Cancelled while index 2 is in flight: index 2 completes, index 3
        // never starts.
        let mut on_progress = move |p: &ExportProgress| {
            if p.phase == Phase::Writing && p.current == 3 {
                trigger.cancel();
            }
        };
        let results = svc
            .run(&notes(10), ExportFormat::Markdown, &mut on_progress, &token)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_nothing() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let results = service(&dir)
            .run(&notes(4), ExportFormat::Html, &mut |_: &ExportProgress| {}, &token)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pdf_timeout_yields_export_timeout() {
        let dir = tempdir().unwrap();
        let fake = FakeSerializer::slow(ExportFormat::Pdf, Duration::from_secs(600));
        let svc = service(&dir).with_serializer(fake);

        let results = svc
            .run(&notes(2), ExportFormat::Pdf, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.error_code(), Some(ExportErrorCode::ExportTimeout));
            assert_eq!(result.processing_time(), Duration::from_secs(120));
            assert!(result.suggests_markdown_retry());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_only_applies_to_pdf() {
        let dir = tempdir().unwrap();
        let fake = FakeSerializer::slow(ExportFormat::Html, Duration::from_secs(600));
        let svc = service(&dir).with_serializer(fake);

        let results = svc
            .run(&notes(1), ExportFormat::Html, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert!(results[0].is_success());
        assert!(results[0].processing_time() >= Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_serializer_failure_does_not_abort_batch() {
        let dir = tempdir().unwrap();
        let svc = service(&dir).with_serializer(FakeSerializer::new(ExportFormat::Html));
        let mut batch = notes(3);
        batch[1].title = "bad".into();

        let results = svc
            .run(&batch, ExportFormat::Html, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert!(results[2].is_success());
        match &results[1] {
            ExportResult::Failure {
                source,
                error,
                error_code,
                ..
            } => {
                assert_eq!(source, "bad");
                assert!(error.contains("boom"));
                assert_eq!(*error_code, ExportErrorCode::RenderError);
            }
            ExportResult::Success { .. } => panic!("expected failure"),
        }
        assert!(!results[1].suggests_markdown_retry());
    }

    #[tokio::test]
    async fn test_serializer_panic_fails_only_its_note() {
        let dir = tempdir().unwrap();
        let fake = FakeSerializer::new(ExportFormat::Html);
        let svc = service(&dir).with_serializer(fake.clone());
        let mut batch = notes(3);
        batch[1].title = "panic".into();

        let results = svc
            .run(&batch, ExportFormat::Html, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
        assert!(results[0].is_success());
        assert!(results[2].is_success());
        match &results[1] {
            ExportResult::Failure {
                source,
                error,
                error_code,
                ..
            } => {
                assert_eq!(source, "panic");
                assert!(error.contains("render exploded"));
                assert_eq!(*error_code, ExportErrorCode::RenderError);
            }
            ExportResult::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_unimplemented_formats_fail_immediately() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        for format in [ExportFormat::Txt, ExportFormat::Docx] {
            let results = svc
                .run(&notes(2), format, &mut |_: &ExportProgress| {}, &CancellationToken::new())
                .await;
            assert_eq!(results.len(), 2);
            for result in &results {
                assert_eq!(result.error_code(), Some(ExportErrorCode::FormatNotImplemented));
                assert_eq!(result.processing_time(), Duration::ZERO);
                assert_eq!(result.format(), format);
            }
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_as_markdown_reexports_timed_out_notes() {
        let dir = tempdir().unwrap();
        let svc = service(&dir)
            .with_serializer(FakeSerializer::slow(ExportFormat::Pdf, Duration::from_secs(600)));
        let batch = notes(2);

        let first = svc
            .run(&batch, ExportFormat::Pdf, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;
        let retried = svc
            .retry_as_markdown(&batch, &first, &mut |_: &ExportProgress| {}, &CancellationToken::new())
            .await;

        assert_eq!(retried.len(), 2);
        assert!(retried.iter().all(|r| r.is_success() && r.format() == ExportFormat::Markdown));
    }
}
