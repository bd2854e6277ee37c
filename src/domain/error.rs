//! Domain-level error types for note-porter.
//!
//! `AppError` covers failures outside a batch (config, opening the store,
//! filesystem setup). Per-item pipeline failures are plain values, see
//! [`ImportError`] and the export error codes, and are always collected
//! into a batch report instead of being propagated.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Input path does not exist.
    #[error("Input not found at: {path}")]
    NotFound { path: PathBuf },

    /// Failed to open or query the note database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid or corrupted input data.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A network client could not be set up.
    #[error("Network error: {message}")]
    Network { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// JSON serialization failed.
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON error.
    pub fn json(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Classification of a failed import item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportErrorCode {
    /// The input unit is malformed.
    ParseError,
    /// The storage collaborator rejected the write.
    PersistError,
    /// The input could not be read.
    IoError,
    /// A symlink points back at one of its ancestors.
    SymlinkCycle,
    /// A directory lies beyond the configured walk depth.
    DepthLimit,
    /// The input is not a format this pipeline understands.
    UnsupportedInput,
}

impl ImportErrorCode {
    /// Stable string form used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::PersistError => "PERSIST_ERROR",
            Self::IoError => "IO_ERROR",
            Self::SymlinkCycle => "SYMLINK_CYCLE",
            Self::DepthLimit => "DEPTH_LIMIT",
            Self::UnsupportedInput => "UNSUPPORTED_INPUT",
        }
    }
}

impl fmt::Display for ImportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed import unit. Collected, never propagated past the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportError {
    /// File name, archive entry, or vault path the error is scoped to.
    pub source: String,
    /// Human-readable reason.
    pub message: String,
    /// Machine-readable classification.
    pub code: ImportErrorCode,
}

impl ImportError {
    /// Create an import error.
    pub fn new(source: impl Into<String>, message: impl Into<String>, code: ImportErrorCode) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            code,
        }
    }

    /// Malformed input unit.
    pub fn parse(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, message, ImportErrorCode::ParseError)
    }

    /// Unreadable input.
    pub fn io(source: impl Into<String>, err: &std::io::Error) -> Self {
        Self::new(source, err.to_string(), ImportErrorCode::IoError)
    }

    /// Storage write failure.
    pub fn persist(source: impl Into<String>, err: &AppError) -> Self {
        Self::new(source, err.to_string(), ImportErrorCode::PersistError)
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.source, self.message, self.code)
    }
}

impl std::error::Error for ImportError {}

/// Classification of a failed export item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportErrorCode {
    /// The PDF render exceeded its time budget.
    ExportTimeout,
    /// The format is declared but has no serializer.
    FormatNotImplemented,
    /// A network resource (fonts) could not be fetched.
    NetworkError,
    /// The serializer failed to produce a document.
    RenderError,
    /// The artifact could not be written to disk.
    WriteError,
}

impl ExportErrorCode {
    /// Stable string form used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExportTimeout => "EXPORT_TIMEOUT",
            Self::FormatNotImplemented => "FORMAT_NOT_IMPLEMENTED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RenderError => "RENDER_ERROR",
            Self::WriteError => "WRITE_ERROR",
        }
    }

    /// Whether a failure with this code is worth retrying as Markdown.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ExportTimeout | Self::NetworkError)
    }
}

impl fmt::Display for ExportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by a serializer. Converted to an `ExportResult::Failure`
/// at the item boundary.
#[derive(Error, Debug)]
pub enum SerializeError {
    /// A network-fetched resource was unavailable.
    #[error("network error: {message}")]
    Network { message: String },

    /// The document could not be rendered.
    #[error("render error: {message}")]
    Render { message: String },

    /// The rendered artifact could not be written.
    #[error("write error: {message}")]
    Write {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl SerializeError {
    /// Create a render error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Create a write error from an IO error.
    pub fn write(err: std::io::Error) -> Self {
        Self::Write {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Map onto the report error code.
    #[must_use]
    pub const fn code(&self) -> ExportErrorCode {
        match self {
            Self::Network { .. } => ExportErrorCode::NetworkError,
            Self::Render { .. } => ExportErrorCode::RenderError,
            Self::Write { .. } => ExportErrorCode::WriteError,
        }
    }
}
