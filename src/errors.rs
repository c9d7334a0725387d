// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::trigger::ValidationErrors;

#[derive(Error, Debug)]
pub enum TriggerdError {
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("External process error: {0}")]
    ExternalProcess(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ValidationErrors> for TriggerdError {
    fn from(errors: ValidationErrors) -> Self {
        TriggerdError::Validation(errors)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TriggerdError>;

/// Turn an `anyhow` error coming out of the fs layer into `IoError`, keeping
/// the underlying `io::ErrorKind` when there is one.
pub fn io_failure(err: anyhow::Error) -> TriggerdError {
    let kind = err
        .downcast_ref::<std::io::Error>()
        .map(|e| e.kind())
        .unwrap_or(std::io::ErrorKind::Other);
    TriggerdError::IoError(std::io::Error::new(kind, format!("{err:#}")))
}
