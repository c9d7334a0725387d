// src/config/mod.rs

//! Configuration loading and validation for triggerd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk, falling back to defaults (`loader.rs`).
//! - Turn raw strings into typed durations/enums and reject bad values
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BuildConfig, CommitsConfig, ConfigFile, ExchangeConfig, NotifyConfig, RawConfigFile,
    TelemetryConfig, WatcherConfig,
};
pub use validate::parse_duration;
