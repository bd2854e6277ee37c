//! Configuration for the import/export pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Skip dot-directories (`.obsidian`, `.trash`) and dotfiles in vaults.
    #[serde(default = "default_skip_hidden")]
    pub skip_hidden: bool,

    /// Maximum directory depth walked inside a vault.
    #[serde(default = "default_max_vault_depth")]
    pub max_vault_depth: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            skip_hidden: default_skip_hidden(),
            max_vault_depth: default_max_vault_depth(),
        }
    }
}

const fn default_skip_hidden() -> bool {
    true
}

const fn default_max_vault_depth() -> usize {
    64
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Hard limit for one PDF render, in seconds.
    #[serde(default = "default_pdf_timeout")]
    pub pdf_timeout_secs: u64,

    /// Where exported files go. Defaults to `<data_dir>/exports`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// TrueType font fetched over HTTP and embedded in PDFs.
    #[serde(default)]
    pub pdf_font_url: Option<String>,

    /// Timeout for the font download, in seconds.
    #[serde(default = "default_font_fetch_timeout")]
    pub font_fetch_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pdf_timeout_secs: default_pdf_timeout(),
            output_dir: None,
            pdf_font_url: None,
            font_fetch_timeout_secs: default_font_fetch_timeout(),
        }
    }
}

const fn default_pdf_timeout() -> u64 {
    120 // 2 minutes
}

const fn default_font_fetch_timeout() -> u64 {
    30
}

impl ExportConfig {
    #[must_use]
    pub const fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_timeout_secs)
    }

    #[must_use]
    pub const fn font_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.font_fetch_timeout_secs)
    }
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".note-porter")
    }

    /// Get the note database path.
    #[must_use]
    pub fn notes_db_path(&self) -> PathBuf {
        self.data_dir().join("notes.db")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }

    /// Get the directory stored attachments are copied into.
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir().join("attachments")
    }

    /// Get the exports directory path.
    #[must_use]
    pub fn exports_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("exports"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.export.pdf_timeout(), Duration::from_secs(120));
        assert!(config.import.skip_hidden);
        assert!(config.export.pdf_font_url.is_none());
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let mut config = AppConfig::default();
        config.paths.data_dir = Some(PathBuf::from("/tmp/np"));
        assert_eq!(config.notes_db_path(), PathBuf::from("/tmp/np/notes.db"));
        assert_eq!(config.exports_dir(), PathBuf::from("/tmp/np/exports"));

        config.export.output_dir = Some(PathBuf::from("/srv/out"));
        assert_eq!(config.exports_dir(), PathBuf::from("/srv/out"));
    }
}
