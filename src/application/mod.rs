//! Application layer - parsers, serializers and the batch orchestrators.
//!
//! Parsers turn foreign formats into `ParsedNote`s, serializers turn stored
//! notes into files, and the two services drive them over batches.

pub mod enex_parser;
mod enml;
pub mod export_service;
pub mod formatter;
pub mod html_serializer;
pub mod import_service;
pub mod markdown_parser;
pub mod pdf_serializer;
mod pdf_writer;
pub mod serializer;
pub mod vault_parser;

pub use enex_parser::{parse_enex, EnexEntry};
pub use export_service::{ExportProgressFn, ExportService};
pub use formatter::{
    format_export_progress, format_export_summary, format_folder_tree, format_import_progress,
    format_import_summary, format_json, format_notes_table, OutputFormat,
};
pub use html_serializer::HtmlSerializer;
pub use import_service::{ImportProgressFn, ImportService, InputRef};
pub use markdown_parser::parse_markdown;
pub use pdf_serializer::PdfSerializer;
pub use serializer::{MarkdownSerializer, NoteSerializer};
pub use vault_parser::{scan_vault, VaultFolder, VaultNote, VaultOptions, VaultScan};
