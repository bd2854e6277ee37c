//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# note-porter configuration
# Auto-generated - edit as needed

[import]
# Skip dot-directories (.obsidian, .trash) and dotfiles inside vaults
skip_hidden = true

# Maximum directory depth walked inside a vault
max_vault_depth = 64

[export]
# Hard limit for rendering one PDF, in seconds (default: 120 = 2 minutes)
pdf_timeout_secs = 120

# Directory for exported files (optional, defaults to <data_dir>/exports)
# output_dir = "/path/to/exports"

# TrueType font to download and embed in PDFs (optional, defaults to Helvetica)
# pdf_font_url = "https://example.com/fonts/NotoSans-Regular.ttf"

# Timeout for the font download, in seconds
font_fetch_timeout_secs = 30

[paths]
# Custom data directory (optional, defaults to ~/.note-porter)
# data_dir = "/custom/path"
"#;

/// Load configuration from `path`, or the default location, or built-in
/// defaults when no file exists.
///
/// # Errors
/// Returns error if a file exists but cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config_path = path.map_or_else(config_file_path, Path::to_path_buf);

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else if path.is_some() {
        Err(AppError::NotFound { path: config_path })
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Create the default configuration file at `path` if it doesn't exist.
///
/// Returns `true` when a file was written.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io("Failed to create default config", e))?;

    tracing::info!(path = %path.display(), "Created default configuration");

    Ok(true)
}

/// Get the path to the default configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}
