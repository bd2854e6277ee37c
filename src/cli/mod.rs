//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::ExportFormat;

/// Note Porter - import notes from Markdown, Evernote and Obsidian, export
/// them as Markdown, HTML or PDF.
#[derive(Parser, Debug)]
#[command(name = "note-porter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Report format: table or json.
    #[arg(short, long, default_value = "table", global = true)]
    pub report: String,

    /// Config file (default: <data dir>/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the note database and attachments.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import Markdown files, .enex archives or Obsidian vault directories.
    Import {
        /// Files or directories to import, processed in order.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Export stored notes.
    Export {
        /// Output format: md, html, pdf, txt, docx.
        #[arg(short, long, default_value = "md")]
        format: ExportFormat,

        /// Output directory (default: from config, then <data dir>/exports).
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Note IDs to export (all notes if not specified).
        #[arg(short, long = "note")]
        notes: Vec<i64>,

        /// Export at most this many of the most recent notes (0 = all).
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Re-export PDF failures caused by timeouts or network errors as Markdown.
        #[arg(long)]
        retry_markdown: bool,
    },

    /// List stored notes.
    List {
        /// Maximum number of notes to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Show the folder tree instead of notes.
        #[arg(long)]
        folders: bool,
    },

    /// Write a default config file if none exists.
    InitConfig,
}

impl Cli {
    /// Parse the report format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.report.parse()
    }
}
