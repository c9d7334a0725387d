// src/config/loader.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TriggerdError};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Strict loading: read TOML, validate, resolve relative paths against the
/// config file's directory. Any problem is an error.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    config.resolve_paths(&config_root_dir(path));
    Ok(config)
}

/// Loading used by the daemons and the generator.
///
/// - Missing file: documented defaults, with a warning.
/// - Anything else (unreadable file, bad TOML syntax, unknown enum value,
///   wrong value type, or a parsed but semantically invalid value):
///   `ConfigError`. Falling back to defaults for a file that exists would
///   silently move the exchange directory.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let root = config_root_dir(path);

    let raw = match load_from_path(path) {
        Ok(raw) => {
            info!(config = ?path, "loaded configuration");
            raw
        }
        Err(TriggerdError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            warn!(config = ?path, "config file not found; using defaults");
            RawConfigFile::default()
        }
        Err(e) => {
            return Err(TriggerdError::ConfigError(format!(
                "config file {:?} is unusable: {e}",
                path
            )));
        }
    };

    let mut config = ConfigFile::try_from(raw)?;
    config.resolve_paths(&root);
    Ok(config)
}

/// Helper to resolve a default config path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Triggerd.toml")
}

/// Directory against which relative paths in the config are resolved.
///
/// - If the config path has a non-empty parent (e.g. "deploy/Triggerd.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Triggerd.toml" (parent = ""),
///   we fall back to the current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
