//! Domain layer - core types shared by the pipeline.
//!
//! This layer contains pure domain models, progress and report values, and
//! error types without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;
pub mod progress;
pub mod report;
pub mod store;

pub use config::{AppConfig, ExportConfig, ImportConfig, PathConfig};
pub use error::{
    AppError, ExportErrorCode, ImportError, ImportErrorCode, Result, SerializeError,
};
pub use models::{AttachmentRef, FileHandle, Folder, FolderId, Note, NoteId, ParsedNote};
pub use progress::{ExportProgress, ImportProgress, Phase};
pub use report::{
    ExportFailure, ExportFormat, ExportResult, ExportSummary, ImportResult, ImportSummary,
};
pub use store::NoteStore;
