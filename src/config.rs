//! User configuration
//!
//! Read from `config.toml` in the logsift config directory
//! (`~/.config/logsift/` on Linux). Every key is optional; a missing file
//! means defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use logsift_logs::IngestOptions;

/// Errors loading the config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default tracing directive, used when `RUST_LOG` does not cover a target
    pub log_level: String,

    /// Filter worker threads; 0 means one per CPU
    pub worker_threads: usize,

    /// Longest header-plus-continuation run before it is reported as suspicious
    pub max_entry_len: usize,

    /// Leading lines of a suspicious source searched for the bug report marker
    pub bugreport_scan_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        let ingest = IngestOptions::default();
        Self {
            log_level: "warn".to_string(),
            worker_threads: 0,
            max_entry_len: ingest.max_entry_len,
            bugreport_scan_lines: ingest.bugreport_scan_lines,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("logsift").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing default file gives the defaults; an explicitly named file
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_entry_len: self.max_entry_len,
            bugreport_scan_lines: self.bugreport_scan_lines,
        }
    }
}
