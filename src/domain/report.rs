//! Batch results returned by the import and export orchestrators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ExportErrorCode, ImportError};
use super::models::FileHandle;

/// Export target formats. Closed set; `Txt` and `Docx` are declared but
/// always fail with `FORMAT_NOT_IMPLEMENTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Pdf,
    Html,
    Txt,
    Docx,
}

impl ExportFormat {
    /// All formats, implemented or not.
    pub const ALL: [Self; 5] = [Self::Markdown, Self::Pdf, Self::Html, Self::Txt, Self::Docx];

    /// Name shown to users.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Markdown => "Markdown",
            Self::Pdf => "PDF",
            Self::Html => "HTML",
            Self::Txt => "Plain Text",
            Self::Docx => "Word Document",
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Txt => "txt",
            Self::Docx => "docx",
        }
    }

    /// Whether a serializer exists for this format.
    #[must_use]
    pub const fn is_implemented(self) -> bool {
        matches!(self, Self::Markdown | Self::Pdf | Self::Html)
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "html" | "htm" => Ok(Self::Html),
            "txt" | "text" => Ok(Self::Txt),
            "docx" => Ok(Self::Docx),
            _ => Err(format!(
                "Unknown format: {s}. Use: markdown, pdf, html, txt, docx"
            )),
        }
    }
}

/// Outcome of importing one input (a file, an archive, or a whole vault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Input name as given to the orchestrator.
    pub source: String,
    /// Notes persisted from this input.
    pub success_count: u32,
    /// Failures scoped to this input, in encounter order.
    pub errors: Vec<ImportError>,
    /// Wall time spent on this input.
    pub duration: Duration,
}

impl ImportResult {
    /// Create an empty result for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            success_count: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Outcome of exporting one note. Exactly one per attempted note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExportResult {
    Success {
        file: FileHandle,
        file_size: u64,
        processing_time: Duration,
        format: ExportFormat,
    },
    Failure {
        /// Title of the note that failed.
        source: String,
        error: String,
        error_code: ExportErrorCode,
        processing_time: Duration,
        format: ExportFormat,
    },
}

impl ExportResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn processing_time(&self) -> Duration {
        match self {
            Self::Success {
                processing_time, ..
            }
            | Self::Failure {
                processing_time, ..
            } => *processing_time,
        }
    }

    #[must_use]
    pub const fn format(&self) -> ExportFormat {
        match self {
            Self::Success { format, .. } | Self::Failure { format, .. } => *format,
        }
    }

    #[must_use]
    pub const fn error_code(&self) -> Option<ExportErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_code, .. } => Some(*error_code),
        }
    }

    /// True when a failed PDF export should be offered as Markdown instead.
    #[must_use]
    pub fn suggests_markdown_retry(&self) -> bool {
        match self {
            Self::Failure {
                error_code, format, ..
            } => *format == ExportFormat::Pdf && error_code.is_transient(),
            Self::Success { .. } => false,
        }
    }
}

/// Aggregate view of an import batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub inputs: usize,
    pub success_count: u64,
    pub error_count: usize,
    pub errors: Vec<ImportError>,
    pub duration: Duration,
}

impl ImportSummary {
    #[must_use]
    pub fn from_results(results: &[ImportResult]) -> Self {
        let mut summary = Self {
            inputs: results.len(),
            ..Self::default()
        };
        for result in results {
            summary.success_count += u64::from(result.success_count);
            summary.error_count += result.errors.len();
            summary.errors.extend(result.errors.iter().cloned());
            summary.duration += result.duration;
        }
        summary
    }
}

/// One failed export, as shown in a summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFailure {
    pub source: String,
    pub message: String,
    pub code: ExportErrorCode,
    pub retry_as_markdown: bool,
}

/// Aggregate view of an export batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub attempted: usize,
    pub success_count: usize,
    pub total_bytes: u64,
    pub failures: Vec<ExportFailure>,
    pub duration: Duration,
}

impl ExportSummary {
    #[must_use]
    pub fn from_results(results: &[ExportResult]) -> Self {
        let mut summary = Self {
            attempted: results.len(),
            ..Self::default()
        };
        for result in results {
            summary.duration += result.processing_time();
            match result {
                ExportResult::Success { file_size, .. } => {
                    summary.success_count += 1;
                    summary.total_bytes += file_size;
                }
                ExportResult::Failure {
                    source,
                    error,
                    error_code,
                    ..
                } => summary.failures.push(ExportFailure {
                    source: source.clone(),
                    message: error.clone(),
                    code: *error_code,
                    retry_as_markdown: result.suggests_markdown_retry(),
                }),
            }
        }
        summary
    }

    /// Whether any failure in the batch would benefit from a Markdown retry.
    #[must_use]
    pub fn any_retry_suggested(&self) -> bool {
        self.failures.iter().any(|f| f.retry_as_markdown)
    }
}
