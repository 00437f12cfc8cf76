//! Configuration file location and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CLIPDECK_ROOT_FOLDER";

/// Application directory name used under platform config/data dirs
const APP_DIR: &str = "clipdeck";

/// Where a resolved root folder came from (for startup logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFolderSource {
    CommandLine,
    Environment,
    ConfigFile,
    Default,
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `CLIPDECK_ROOT_FOLDER` environment variable
/// 3. `root_folder` from the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    config_file_value: Option<&Path>,
) -> (PathBuf, RootFolderSource) {
    if let Some(path) = cli_arg {
        return (path.to_path_buf(), RootFolderSource::CommandLine);
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return (PathBuf::from(path), RootFolderSource::Environment);
        }
    }

    if let Some(path) = config_file_value {
        return (path.to_path_buf(), RootFolderSource::ConfigFile);
    }

    (default_root_folder(), RootFolderSource::Default)
}

/// Locate the configuration file for this platform.
///
/// Linux checks `~/.config/clipdeck/config.toml` then
/// `/etc/clipdeck/config.toml`; other platforms use the platform config dir.
pub fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));

    if cfg!(target_os = "linux") {
        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let path = user_config
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Read a TOML file into a typed value
pub fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    debug!("Read config file {}", path.display());
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/clipdeck
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib").join(APP_DIR))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/clipdeck
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support").join(APP_DIR))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\clipdeck
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData").join(APP_DIR))
    } else {
        PathBuf::from("./clipdeck_data")
    }
}
