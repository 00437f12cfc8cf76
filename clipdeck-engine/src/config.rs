//! Bootstrap configuration for the engine
//!
//! Settings come from an optional TOML file; anything missing falls back to
//! built-in defaults. A missing file is never fatal, a malformed one is.
//!
//! # Priority
//!
//! 1. Command-line arguments (`--database`, `--root-folder`)
//! 2. Environment (`CLIPDECK_ROOT_FOLDER`, `CLIPDECK_PLATFORM`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! Loading happens before logging is initialized, so problems are collected
//! in `EngineConfig::load_warnings` for the caller to log afterwards.

use crate::audio::decoder::{DecodeAdapter, DEFAULT_DECODE_TIMEOUT};
use crate::error::{Error, Result};
use crate::playback::capability::PlatformClass;
use clipdeck_common::config::{config_file_path, read_toml, resolve_root_folder, RootFolderSource};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database file name used when no path is configured
pub const DEFAULT_DATABASE_FILE: &str = "clipdeck.db";

/// Bootstrap configuration file contents
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// SQLite database path; defaults to `<root_folder>/clipdeck.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Folder holding the database and the `sounds/` blob folder
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodeConfig {
    /// Upper bound for decoding one source file
    #[serde(default = "default_decode_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_decode_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlaybackConfig {
    /// Platform class override (`auto`, `desktop`, `touch`, `constrained`)
    #[serde(default)]
    pub platform: PlatformClass,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_decode_timeout_secs() -> u64 {
    DEFAULT_DECODE_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
}

/// Fully resolved engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root_folder: PathBuf,
    pub root_folder_source: RootFolderSource,
    pub database_path: PathBuf,
    pub decode_timeout: Duration,
    pub platform: PlatformClass,
    pub device: Option<String>,
    pub log_level: String,
    /// Config file actually read, if any
    pub config_file: Option<PathBuf>,
    pub load_warnings: Vec<String>,
}

impl EngineConfig {
    /// Locate and read the config file, then apply `overrides`.
    ///
    /// # Errors
    /// `Config` if the file exists but cannot be parsed.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut warnings = Vec::new();

        let path = match &overrides.config_path {
            Some(path) => Some(path.clone()),
            None => config_file_path().ok(),
        };

        let (toml, config_file) = match path {
            Some(path) => match read_toml::<TomlConfig>(&path) {
                Ok(toml) => (toml, Some(path)),
                Err(clipdeck_common::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warnings.push(format!(
                        "Config file {} not found, using built-in defaults",
                        path.display()
                    ));
                    (TomlConfig::default(), None)
                }
                Err(clipdeck_common::Error::Config(msg)) => return Err(Error::Config(msg)),
                Err(e) => return Err(e.into()),
            },
            None => {
                warnings.push("No config file found, using built-in defaults".to_string());
                (TomlConfig::default(), None)
            }
        };

        let mut config = Self::from_toml(toml, overrides);
        config.config_file = config_file;
        warnings.append(&mut config.load_warnings);
        config.load_warnings = warnings;
        Ok(config)
    }

    /// Resolve a parsed TOML file against command-line overrides
    pub fn from_toml(toml: TomlConfig, overrides: &ConfigOverrides) -> Self {
        let mut warnings = Vec::new();

        let (root_folder, root_folder_source) =
            resolve_root_folder(overrides.root_folder.as_deref(), toml.root_folder.as_deref());

        let database_path = overrides
            .database_path
            .clone()
            .or(toml.database_path)
            .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE));

        let decode_timeout = if toml.decode.timeout_secs == 0 {
            warnings.push(format!(
                "decode.timeout_secs must be positive, using {}",
                default_decode_timeout_secs()
            ));
            DEFAULT_DECODE_TIMEOUT
        } else {
            Duration::from_secs(toml.decode.timeout_secs)
        };

        Self {
            root_folder,
            root_folder_source,
            database_path,
            decode_timeout,
            platform: toml.playback.platform,
            device: toml.playback.device,
            log_level: toml.logging.level,
            config_file: None,
            load_warnings: warnings,
        }
    }

    pub fn decode_adapter(&self) -> DecodeAdapter {
        DecodeAdapter::with_timeout(self.decode_timeout)
    }

    pub fn blob_folder(&self) -> PathBuf {
        self.root_folder.join(crate::store::sqlite::BLOB_DIR)
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}
