// src/trigger/writer.rs

//! Builds, validates and persists trigger artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::model::ExchangeConfig;
use crate::errors::{io_failure, Result, TriggerdError};
use crate::fs::FileSystem;
use crate::trigger::model::{Metadata, Priority, Source, TriggerMessage};
use crate::trigger::schema::{RawTrigger, ValidationErrors, SCHEMA_VERSION};
use crate::trigger::template::TemplateRegistry;
use crate::types::ExchangeMode;

/// Identity written into `metadata.generator`.
pub const GENERATOR: &str = concat!("triggerd/", env!("CARGO_PKG_VERSION"));

/// Prefix of queue-mode artifact names.
pub const ARTIFACT_PREFIX: &str = "trigger-";

static ARTIFACT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique artifact id: sub-second timestamp, process id and a process-wide
/// monotonic counter. Ids sort chronologically within one producer.
pub fn unique_artifact_id(now: DateTime<Utc>) -> String {
    let seq = ARTIFACT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{ARTIFACT_PREFIX}{}-{}-{:04}",
        now.format("%Y%m%dT%H%M%S%6f"),
        std::process::id(),
        seq
    )
}

/// Artifact id for a path: the file name without its `.json` extension.
pub fn artifact_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What the caller wants in the trigger. Enum fields stay strings so bad
/// values surface as field errors rather than parse failures.
#[derive(Debug, Clone, Default)]
pub struct TriggerRequest {
    pub action: Option<String>,
    pub commit_hash: String,
    pub commit_message: String,
    /// Empty means "use the template's list".
    pub files_to_check: Vec<String>,
    pub priority: Option<String>,
    pub source: Option<String>,
    pub custom_data: Option<String>,
    pub template: Option<String>,
}

/// Result of a successful write.
#[derive(Debug, Clone)]
pub struct WrittenTrigger {
    pub path: PathBuf,
    pub message: TriggerMessage,
    /// Mailbox mode only: an unconsumed trigger was overwritten (and lost).
    pub replaced_unconsumed: bool,
}

#[derive(Debug, Clone)]
pub struct TriggerWriter {
    fs: Arc<dyn FileSystem>,
    exchange: ExchangeConfig,
    templates: TemplateRegistry,
}

impl TriggerWriter {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        exchange: ExchangeConfig,
        templates: TemplateRegistry,
    ) -> Self {
        Self {
            fs,
            exchange,
            templates,
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Merge template defaults, attach metadata and validate.
    ///
    /// Nothing is written.
    pub fn prepare(
        &self,
        request: &TriggerRequest,
    ) -> std::result::Result<TriggerMessage, ValidationErrors> {
        let now = Utc::now();

        let template = match request.template.as_deref() {
            Some(name) => match self.templates.get(name) {
                Some(t) => Some(t),
                None => {
                    return Err(ValidationErrors::single(
                        "template",
                        format!(
                            "unknown template \"{name}\" (known: {})",
                            self.templates.names().join(", ")
                        ),
                    ));
                }
            },
            None => None,
        };

        let action = request
            .action
            .clone()
            .or_else(|| template.and_then(|t| t.action).map(|a| a.to_string()));
        let priority = request
            .priority
            .clone()
            .or_else(|| template.and_then(|t| t.priority).map(|p| p.to_string()))
            .unwrap_or_else(|| Priority::Normal.to_string());
        let files_to_check = if request.files_to_check.is_empty() {
            template
                .map(|t| t.files_to_check.clone())
                .unwrap_or_default()
        } else {
            request.files_to_check.clone()
        };

        let raw = RawTrigger {
            action,
            commit_hash: Some(request.commit_hash.clone()),
            commit_message: Some(request.commit_message.clone()),
            timestamp: Some(now.to_rfc3339()),
            timezone: Some(self.exchange.timezone.to_string()),
            files_to_check: Some(files_to_check),
            priority: Some(priority),
            source: Some(
                request
                    .source
                    .clone()
                    .unwrap_or_else(|| Source::Automated.to_string()),
            ),
            custom_data: request.custom_data.clone(),
            metadata: Some(Metadata {
                generator: GENERATOR.to_string(),
                template: template.map(|t| t.name.clone()),
                schema_version: SCHEMA_VERSION.to_string(),
                generated_at: now,
            }),
        };

        let id = match self.exchange.mode {
            ExchangeMode::Queue => unique_artifact_id(now),
            ExchangeMode::Mailbox => artifact_id(Path::new(&self.exchange.mailbox_file)),
        };

        raw.into_message(id)
    }

    /// Validate and persist. On validation failure nothing is written.
    pub fn write(&self, request: &TriggerRequest) -> Result<WrittenTrigger> {
        let message = self.prepare(request).map_err(TriggerdError::Validation)?;
        self.persist(message)
    }

    /// Persist an already validated message.
    pub fn persist(&self, message: TriggerMessage) -> Result<WrittenTrigger> {
        let dir = &self.exchange.trigger_dir;
        self.fs.create_dir_all(dir).map_err(io_failure)?;

        let path = match self.exchange.mode {
            ExchangeMode::Queue => dir.join(format!("{}.json", message.id)),
            ExchangeMode::Mailbox => dir.join(&self.exchange.mailbox_file),
        };

        let replaced_unconsumed =
            self.exchange.mode == ExchangeMode::Mailbox && self.fs.exists(&path);
        if replaced_unconsumed {
            warn!(
                path = ?path,
                "mailbox still holds an unconsumed trigger; overwriting it (legacy single-slot mode is lossy)"
            );
        } else if self.fs.exists(&path) {
            return Err(TriggerdError::IoError(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("artifact {:?} already exists", path),
            )));
        }

        let json = message.to_json()?;
        self.fs
            .write_atomic(&path, json.as_bytes())
            .map_err(io_failure)?;

        info!(
            trigger = %message.id,
            action = %message.action,
            priority = %message.priority,
            commit = %message.short_hash(),
            path = ?path,
            "trigger written"
        );
        debug!(%json, "trigger contents");

        Ok(WrittenTrigger {
            path,
            message,
            replaced_unconsumed,
        })
    }
}
