//! Terminal output for batch reports and note listings.
//!
//! Supports a human-readable table view and JSON for scripting.

use std::time::Duration;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::domain::{
    ExportProgress, ExportResult, ExportSummary, Folder, ImportProgress, ImportResult,
    ImportSummary, Note,
};

/// Report output options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tables and colored summaries.
    #[default]
    Table,
    /// JSON for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Serialize any report as pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// One progress line for an import snapshot.
pub fn format_import_progress(progress: &ImportProgress) -> String {
    format!(
        "[{:>3}%] {} {}",
        progress.percentage(),
        progress.phase.to_string().dimmed(),
        progress.current_file
    )
}

/// One progress line for an export snapshot.
pub fn format_export_progress(progress: &ExportProgress) -> String {
    format!(
        "[{:>3}%] {}/{} {}",
        progress.percentage(),
        progress.current,
        progress.total,
        progress.current_operation
    )
}

/// Per-input table followed by the list of errors.
pub fn format_import_summary(results: &[ImportResult]) -> String {
    let summary = ImportSummary::from_results(results);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Source", "Imported", "Errors", "Time"]);
    for result in results {
        table.add_row(vec![
            truncate(&result.source, 40),
            result.success_count.to_string(),
            result.errors.len().to_string(),
            format_duration(result.duration),
        ]);
    }

    let mut out = table.to_string();
    out.push_str(&format!(
        "\n{} {} notes imported, {} errors ({})",
        "📥".bold(),
        summary.success_count.to_string().green(),
        colour_count(summary.error_count),
        format_duration(summary.duration)
    ));

    for error in &summary.errors {
        out.push_str(&format!(
            "\n  {} {} {}: {}",
            "✗".red(),
            error.code.as_str().yellow(),
            error.source,
            error.message
        ));
    }
    out
}

/// Per-note export table, failures and the retry hint.
pub fn format_export_summary(results: &[ExportResult]) -> String {
    let summary = ExportSummary::from_results(results);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Status", "Format", "Output", "Size", "Time"]);
    for result in results {
        let (status, output, size) = match result {
            ExportResult::Success {
                file, file_size, ..
            } => (
                "ok".to_string(),
                file.path.display().to_string(),
                format_bytes(*file_size),
            ),
            ExportResult::Failure {
                source, error_code, ..
            } => (
                error_code.as_str().to_string(),
                truncate(source, 40),
                "-".to_string(),
            ),
        };
        table.add_row(vec![
            status,
            result.format().display_name().to_string(),
            output,
            size,
            format_duration(result.processing_time()),
        ]);
    }

    let mut out = table.to_string();
    out.push_str(&format!(
        "\n{} {}/{} exported, {} written ({})",
        "📁".bold(),
        summary.success_count.to_string().green(),
        summary.attempted,
        format_bytes(summary.total_bytes),
        format_duration(summary.duration)
    ));

    for failure in &summary.failures {
        out.push_str(&format!(
            "\n  {} {} {}: {}",
            "✗".red(),
            failure.code.as_str().yellow(),
            failure.source,
            failure.message
        ));
    }

    if summary.any_retry_suggested() {
        out.push_str(&format!(
            "\n{} Some PDF exports failed on timeout or network. Re-run with {} to export them as Markdown.",
            "💡".bold(),
            "--retry-markdown".cyan()
        ));
    }
    out
}

/// Table listing of stored notes.
pub fn format_notes_table(notes: &[Note]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Updated", "Tags", "Title"]);

    for note in notes {
        let tags = if note.tags.is_empty() {
            "-".to_string()
        } else {
            truncate(&note.tags.iter().cloned().collect::<Vec<_>>().join(", "), 24)
        };

        table.add_row(vec![
            note.id.to_string(),
            note.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            tags,
            truncate(&note.display_title(), 40),
        ]);
    }

    table.to_string()
}

/// Folder tree, children indented under their parents.
pub fn format_folder_tree(folders: &[Folder]) -> String {
    fn walk(folders: &[Folder], parent: Option<crate::domain::FolderId>, depth: usize, out: &mut String) {
        for folder in folders.iter().filter(|f| f.parent == parent) {
            out.push_str(&format!("{}📂 {}\n", "  ".repeat(depth), folder.name));
            walk(folders, Some(folder.id), depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(folders, None, 0, &mut out);
    out
}

fn colour_count(count: usize) -> colored::ColoredString {
    if count == 0 {
        count.to_string().green()
    } else {
        count.to_string().red()
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m {:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else if duration.as_millis() >= 1000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Format bytes to human-readable string.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExportErrorCode, ExportFormat, FolderId, ImportError, ImportErrorCode};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("héllo wörld!", 8), "héllo...");
    }

    #[test]
    fn test_format_bytes_and_duration() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m 00s");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_import_summary_lists_errors() {
        colored::control::set_override(false);
        let mut result = ImportResult::new("export.enex");
        result.success_count = 4;
        result
            .errors
            .push(ImportError::parse("export.enex (note 3)", "bad XML"));

        let out = format_import_summary(&[result]);
        assert!(out.contains("export.enex"));
        assert!(out.contains("4 notes imported, 1 errors"));
        assert!(out.contains("PARSE_ERROR export.enex (note 3): bad XML"));
    }

    #[test]
    fn test_export_summary_suggests_retry_for_pdf_timeout() {
        colored::control::set_override(false);
        let results = vec![ExportResult::Failure {
            source: "Slow".into(),
            error: "PDF export did not finish within 120s".into(),
            error_code: ExportErrorCode::ExportTimeout,
            processing_time: Duration::from_secs(120),
            format: ExportFormat::Pdf,
        }];

        let out = format_export_summary(&results);
        assert!(out.contains("EXPORT_TIMEOUT"));
        assert!(out.contains("0/1 exported"));
        assert!(out.contains("--retry-markdown"));
    }

    #[test]
    fn test_folder_tree_nests_children() {
        let folders = vec![
            Folder {
                id: FolderId(1),
                name: "Vault".into(),
                parent: None,
            },
            Folder {
                id: FolderId(2),
                name: "Work".into(),
                parent: Some(FolderId(1)),
            },
        ];
        assert_eq!(format_folder_tree(&folders), "📂 Vault\n  📂 Work\n");
    }

    #[test]
    fn test_import_error_code_rendered_in_json() {
        let result = ImportResult {
            source: "x.md".into(),
            success_count: 0,
            errors: vec![ImportError::new("x.md", "nope", ImportErrorCode::UnsupportedInput)],
            duration: Duration::ZERO,
        };
        let json = format_json(&[result]).unwrap();
        assert!(json.contains("\"UNSUPPORTED_INPUT\""));
    }
}
