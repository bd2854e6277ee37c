//! Infrastructure layer - external adapters (database, filesystem, network).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod export_target;
pub mod fonts;
pub mod note_store;
pub mod staging;

pub use config::{config_file_path, ensure_config_exists, load_config, load_config_from_file};
pub use export_target::{file_stem_for_title, ExportTarget};
pub use fonts::{FontError, FontSource, HttpFontSource, PdfFont, StandardFonts};
pub use note_store::{SqliteNoteStore, StoredAttachment};
pub use staging::StagingArea;
