// src/archive/mod.rs

//! Terminal storage for processed artifacts.
//!
//! Each archived artifact keeps its original content as `<id>.json` next to
//! an immutable `<id>.record.json`. Successes go to `archive/`, failures to
//! `archive/error/`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::model::ExchangeConfig;
use crate::errors::{io_failure, Result, TriggerdError};
use crate::fs::FileSystem;
use crate::trigger::{FieldError, TriggerMessage};

const RECORD_SUFFIX: &str = ".record.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveOutcome {
    #[serde(rename = "archived")]
    Archived,
    #[serde(rename = "error-archived")]
    ErrorArchived,
}

impl ArchiveOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveOutcome::Archived => "archived",
            ArchiveOutcome::ErrorArchived => "error-archived",
        }
    }
}

impl std::fmt::Display for ArchiveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How processing ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordResult {
    Handled { detail: String },
    HandlerFailed { error: String },
    ValidationFailed { errors: Vec<FieldError> },
    Malformed { error: String },
}

impl RecordResult {
    pub fn outcome(&self) -> ArchiveOutcome {
        match self {
            RecordResult::Handled { .. } => ArchiveOutcome::Archived,
            _ => ArchiveOutcome::ErrorArchived,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub id: String,
    pub outcome: ArchiveOutcome,
    pub processed_at: DateTime<Utc>,
    /// Absent when the artifact never validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerMessage>,
    /// Original artifact text, kept when it could not be validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub result: RecordResult,
}

impl ArchiveRecord {
    /// Record for a trigger that went through a handler.
    pub fn for_trigger(trigger: &TriggerMessage, result: RecordResult) -> Self {
        Self {
            id: trigger.id.clone(),
            outcome: result.outcome(),
            processed_at: Utc::now(),
            trigger: Some(trigger.clone()),
            raw: None,
            result,
        }
    }

    /// Record for an artifact that never became a trigger.
    pub fn rejected(id: &str, raw: Option<String>, result: RecordResult) -> Self {
        Self {
            id: id.to_string(),
            outcome: result.outcome(),
            processed_at: Utc::now(),
            trigger: None,
            raw,
            result,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchivalStore {
    fs: Arc<dyn FileSystem>,
    exchange: ExchangeConfig,
}

impl ArchivalStore {
    pub fn new(fs: Arc<dyn FileSystem>, exchange: ExchangeConfig) -> Self {
        Self { fs, exchange }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.exchange.archive_dir(), self.exchange.error_archive_dir()] {
            self.fs.create_dir_all(&dir).map_err(io_failure)?;
        }
        Ok(())
    }

    pub fn dir_for(&self, outcome: ArchiveOutcome) -> PathBuf {
        match outcome {
            ArchiveOutcome::Archived => self.exchange.archive_dir(),
            ArchiveOutcome::ErrorArchived => self.exchange.error_archive_dir(),
        }
    }

    pub fn record_path(&self, outcome: ArchiveOutcome, id: &str) -> PathBuf {
        self.dir_for(outcome).join(format!("{id}{RECORD_SUFFIX}"))
    }

    pub fn artifact_path(&self, outcome: ArchiveOutcome, id: &str) -> PathBuf {
        self.dir_for(outcome).join(format!("{id}.json"))
    }

    /// Existing record for `id` in either archive.
    pub fn find_record(&self, id: &str) -> Result<Option<ArchiveRecord>> {
        for outcome in [ArchiveOutcome::Archived, ArchiveOutcome::ErrorArchived] {
            let path = self.record_path(outcome, id);
            if self.fs.is_file(&path) {
                return self.read_record(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Write the record (unless one already exists) and move the artifact
    /// next to it.
    ///
    /// An existing record is never overwritten, so retrying after a failed
    /// move is safe. On error the artifact stays where it was.
    pub fn archive(&self, artifact: &Path, record: &ArchiveRecord) -> Result<PathBuf> {
        let record_path = self.record_path(record.outcome, &record.id);
        if self.fs.exists(&record_path) {
            debug!(trigger = %record.id, path = ?record_path, "record already present");
        } else {
            let json = serde_json::to_string_pretty(record)?;
            self.fs
                .write_atomic(&record_path, json.as_bytes())
                .map_err(io_failure)?;
        }

        let dest = self.artifact_path(record.outcome, &record.id);
        match self.fs.rename(artifact, &dest) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound && self.fs.is_file(&dest) => {
                debug!(trigger = %record.id, "artifact already archived");
            }
            Err(err) => {
                warn!(trigger = %record.id, from = ?artifact, to = ?dest, error = %err, "archive move failed");
                return Err(TriggerdError::IoError(err));
            }
        }

        info!(trigger = %record.id, outcome = %record.outcome, path = ?dest, "artifact archived");
        Ok(dest)
    }

    /// All records with the given outcome, sorted by id.
    pub fn list(&self, outcome: ArchiveOutcome) -> Result<Vec<ArchiveRecord>> {
        let dir = self.dir_for(outcome);
        if !self.fs.is_dir(&dir) {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = self
            .fs
            .read_dir(&dir)
            .map_err(io_failure)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().ends_with(RECORD_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| self.read_record(p)).collect()
    }

    fn read_record(&self, path: &Path) -> Result<ArchiveRecord> {
        let contents = self.fs.read_to_string(path).map_err(io_failure)?;
        let mut record: ArchiveRecord = serde_json::from_str(&contents)?;
        // The trigger id is not part of its serialized form.
        if let Some(trigger) = record.trigger.as_mut() {
            trigger.id = record.id.clone();
        }
        Ok(record)
    }
}
