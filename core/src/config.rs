//! Capture configuration (`cputrace.toml`)
//!
//! Settings are stored as TOML in the platform-specific config directory.
//! Missing fields take their defaults, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TraceError};
use crate::trace::DEFAULT_CAPACITY_WORDS;

/// File name looked up in [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "cputrace.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Words reserved for a new trace (default: 1M words, 4 MiB)
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity_words: usize,
    /// Unflushed words that trigger an incremental write during capture
    /// (default: 0, write everything once when the capture finishes)
    #[serde(default)]
    pub flush_threshold_words: usize,
    /// Directory relative trace paths resolve against (default: working directory)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_initial_capacity() -> usize {
    DEFAULT_CAPACITY_WORDS
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            initial_capacity_words: default_initial_capacity(),
            flush_threshold_words: 0,
            output_dir: None,
        }
    }
}

impl TraceConfig {
    /// Read a config file, failing if it is missing or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            TraceError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Write this config as TOML, creating parent directories.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TraceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a trace path against `output_dir`. Absolute paths are kept.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.output_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\cputrace\config`
/// On macOS: `~/Library/Application Support/io.cputrace.cputrace`
/// On Linux: `~/.config/cputrace`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.cputrace", "", "cputrace")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Returns defaults if the file doesn't exist or cannot be parsed.
pub fn load() -> TraceConfig {
    let Some(path) = config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) else {
        return TraceConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            TraceConfig::default()
        }),
        Err(_) => TraceConfig::default(),
    }
}

/// Saves the configuration to the platform's configuration directory.
pub fn save(config: &TraceConfig) -> Result<()> {
    match config_dir() {
        Some(dir) => config.to_file(dir.join(CONFIG_FILE_NAME)),
        None => Ok(()),
    }
}
