// src/dispatch/sink.rs

//! Where "analysis ready" notifications go.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::model::NotifyConfig;
use crate::fs::FileSystem;
use crate::trigger::{Priority, Timezone};
use crate::types::SinkKind;

/// Emitted once the analyze handler has picked the file to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReady {
    pub trigger_id: String,
    pub commit_hash: String,
    pub commit_message: String,
    /// Path relative to the repository root, `/`-separated.
    pub file: String,
    pub timestamp: DateTime<Utc>,
    pub timezone: Timezone,
    pub priority: Priority,
}

pub trait NotificationSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, notification: &AnalysisReady) -> Result<()>;
}

/// One plain-text line per notification on stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn emit(&self, n: &AnalysisReady) -> Result<()> {
        println!(
            "analysis ready: {} (trigger {}, commit {}, priority {})",
            n.file, n.trigger_id, n.commit_hash, n.priority
        );
        Ok(())
    }
}

/// Appends one JSON line per notification to a file.
#[derive(Debug, Clone)]
pub struct LogFileSink {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl LogFileSink {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }
}

impl NotificationSink for LogFileSink {
    fn emit(&self, n: &AnalysisReady) -> Result<()> {
        let mut line = serde_json::to_string(n)?;
        line.push('\n');
        self.fs.append(&self.path, line.as_bytes())?;
        debug!(path = ?self.path, trigger = %n.trigger_id, "notification appended");
        Ok(())
    }
}

/// Writes one JSON file per notification into a directory.
#[derive(Debug, Clone)]
pub struct QueueDirSink {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl QueueDirSink {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }
}

impl NotificationSink for QueueDirSink {
    fn emit(&self, n: &AnalysisReady) -> Result<()> {
        let path = self.dir.join(format!("analysis-{}.json", n.trigger_id));
        let json = serde_json::to_string_pretty(n)?;
        self.fs.write_atomic(&path, json.as_bytes())?;
        debug!(path = ?path, trigger = %n.trigger_id, "notification queued");
        Ok(())
    }
}

/// Sink selected by `[notify]`.
pub fn build_sink(cfg: &NotifyConfig, fs: Arc<dyn FileSystem>) -> Result<Arc<dyn NotificationSink>> {
    match (cfg.sink, cfg.path.as_ref()) {
        (SinkKind::Console, _) => Ok(Arc::new(ConsoleSink)),
        (SinkKind::Log, Some(path)) => Ok(Arc::new(LogFileSink::new(fs, path.clone()))),
        (SinkKind::Queue, Some(dir)) => Ok(Arc::new(QueueDirSink::new(fs, dir.clone()))),
        (kind, None) => bail!("notify sink {kind:?} needs a path"),
    }
}
