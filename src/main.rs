//! Note Porter - import and export notes from the command line.
//!
//!   note-porter import notes.enex ~/Vault todo.md   # Import into the local store
//!   note-porter list                                # See what is stored
//!   note-porter export --format pdf --note 3        # Export one note as PDF
//!   note-porter export --format html --dir out/     # Export everything as HTML

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use note_porter::application::{
    format_export_progress, format_export_summary, format_folder_tree, format_import_progress,
    format_import_summary, format_json, format_notes_table, ExportService, ImportService,
    InputRef, OutputFormat,
};
use note_porter::cli::{Cli, Commands};
use note_porter::domain::{
    self, AppConfig, AppError, ExportFormat, ExportProgress, ImportProgress, NoteId,
};
use note_porter::infrastructure::{
    ensure_config_exists, load_config, ExportTarget, FontSource, HttpFontSource,
    SqliteNoteStore, StandardFonts,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;
    let config = resolve_config(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Import { paths } => cmd_import(&config, &paths, format)?,
        Commands::Export {
            format: export_format,
            dir,
            notes,
            limit,
            retry_markdown,
        } => {
            let options = ExportOptions {
                format: export_format,
                dir,
                notes: notes.into_iter().map(NoteId).collect(),
                limit,
                retry_markdown,
            };
            cmd_export(&config, options, format).await?;
        }
        Commands::List { limit, folders } => cmd_list(&config, limit, folders, format)?,
        Commands::InitConfig => cmd_init_config(&config)?,
    }

    Ok(())
}

/// Config from `--config`, else `<data dir>/config.toml`, with `--data-dir`
/// taking precedence over the file's `[paths]`.
fn resolve_config(config: Option<&Path>, data_dir: Option<&Path>) -> domain::Result<AppConfig> {
    let path = config.map(Path::to_path_buf).or_else(|| {
        data_dir
            .map(|dir| dir.join("config.toml"))
            .filter(|p| p.exists())
    });

    let mut config = load_config(path.as_deref())?;
    if let Some(dir) = data_dir {
        config.paths.data_dir = Some(dir.to_path_buf());
    }
    Ok(config)
}

fn open_store(config: &AppConfig) -> domain::Result<SqliteNoteStore> {
    SqliteNoteStore::open(&config.notes_db_path(), &config.attachments_dir())
}

/// Import command.
fn cmd_import(config: &AppConfig, paths: &[PathBuf], format: OutputFormat) -> domain::Result<()> {
    let store = open_store(config)?;
    let inputs: Vec<InputRef> = paths.iter().map(InputRef::from_path).collect();

    let show_progress = format == OutputFormat::Table;
    let mut on_progress = |progress: &ImportProgress| {
        if show_progress {
            eprintln!("{}", format_import_progress(progress));
        }
    };

    let results = ImportService::new(&store, &config.import).run(&inputs, &mut on_progress);

    match format {
        OutputFormat::Table => println!("{}", format_import_summary(&results)),
        OutputFormat::Json => println!("{}", format_json(&results).map_err(AppError::json)?),
    }

    Ok(())
}

struct ExportOptions {
    format: ExportFormat,
    dir: Option<PathBuf>,
    notes: Vec<NoteId>,
    limit: usize,
    retry_markdown: bool,
}

/// Export command. Ctrl-C stops the batch after the note in flight.
async fn cmd_export(
    config: &AppConfig,
    options: ExportOptions,
    format: OutputFormat,
) -> domain::Result<()> {
    let notes = {
        let store = open_store(config)?;
        if options.notes.is_empty() {
            let limit = if options.limit == 0 {
                usize::MAX
            } else {
                options.limit
            };
            store.list_notes(limit)?
        } else {
            store.get_notes(&options.notes)?
        }
    };

    let dir = options.dir.unwrap_or_else(|| config.exports_dir());
    let service = ExportService::new(ExportTarget::new(dir)?, &config.export, font_source(config)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current note...".yellow());
            on_signal.cancel();
        }
    });

    let show_progress = format == OutputFormat::Table;
    let mut on_progress = move |progress: &ExportProgress| {
        if show_progress {
            eprint!("\r\x1b[2K{}", format_export_progress(progress));
            let _ = std::io::stderr().flush();
        }
    };

    let mut results = service
        .run(&notes, options.format, &mut on_progress, &cancel)
        .await;
    if show_progress {
        eprintln!();
    }

    if options.retry_markdown {
        let retried = service
            .retry_as_markdown(&notes, &results, &mut on_progress, &cancel)
            .await;
        if show_progress && !retried.is_empty() {
            eprintln!();
        }
        results.extend(retried);
    }

    if cancel.is_cancelled() {
        tracing::warn!(exported = results.len(), total = notes.len(), "Export cancelled");
    }

    match format {
        OutputFormat::Table => println!("{}", format_export_summary(&results)),
        OutputFormat::Json => println!("{}", format_json(&results).map_err(AppError::json)?),
    }

    Ok(())
}

fn font_source(config: &AppConfig) -> domain::Result<Arc<dyn FontSource>> {
    match &config.export.pdf_font_url {
        Some(url) => {
            let source = HttpFontSource::new(url.clone(), config.export.font_fetch_timeout())
                .map_err(|e| AppError::Network {
                    message: e.to_string(),
                })?;
            Ok(Arc::new(source))
        }
        None => Ok(Arc::new(StandardFonts)),
    }
}

/// List command.
fn cmd_list(
    config: &AppConfig,
    limit: usize,
    folders: bool,
    format: OutputFormat,
) -> domain::Result<()> {
    let store = open_store(config)?;

    if folders {
        let folders = store.list_folders()?;
        match format {
            OutputFormat::Table => print!("{}", format_folder_tree(&folders)),
            OutputFormat::Json => println!("{}", format_json(&folders).map_err(AppError::json)?),
        }
        return Ok(());
    }

    let notes = store.list_notes(limit)?;
    match format {
        OutputFormat::Table => {
            println!("{}", format_notes_table(&notes));
            println!(
                "\nShowing {} of {} notes",
                notes.len().to_string().cyan(),
                store.count_notes()?.to_string().cyan()
            );
        }
        OutputFormat::Json => println!("{}", format_json(&notes).map_err(AppError::json)?),
    }

    Ok(())
}

/// Init-config command.
fn cmd_init_config(config: &AppConfig) -> domain::Result<()> {
    let path = config.config_file_path();
    if ensure_config_exists(&path)? {
        println!("{} Created {}", "✓".green().bold(), path.display());
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
