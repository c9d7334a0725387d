// src/dispatch/analyze.rs

//! Handler for `analyze_test_results`: pull, find the freshest matching
//! result file and announce it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::exec::{BoxFuture, VcsClient};
use crate::fs::FileSystem;
use crate::trigger::TriggerMessage;
use crate::watch::patterns::{collect_matching_files, relative_slash_path, FilePatterns};

use super::sink::{AnalysisReady, NotificationSink};
use super::{ActionHandler, DispatchError, HandlerReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Relative to the repository root, `/`-separated.
    pub relative: String,
    pub modified: SystemTime,
}

/// Pick the most recently modified file. Ties on modification time go to the
/// lexicographically greatest relative path. Files whose mtime cannot be read
/// are skipped.
pub fn select_latest_file(
    fs: &dyn FileSystem,
    root: &Path,
    candidates: &[PathBuf],
) -> Option<SelectedFile> {
    candidates
        .iter()
        .filter_map(|path| {
            let modified = match fs.modified(path) {
                Ok(m) => m,
                Err(err) => {
                    warn!(path = ?path, error = %err, "skipping file with unreadable mtime");
                    return None;
                }
            };
            let relative = relative_slash_path(root, path)?;
            Some(SelectedFile {
                path: path.clone(),
                relative,
                modified,
            })
        })
        .max_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.relative.cmp(&b.relative))
        })
}

fn find_latest(
    fs: &dyn FileSystem,
    root: &Path,
    globs: &[String],
    trigger_id: &str,
) -> Result<SelectedFile, DispatchError> {
    let patterns =
        FilePatterns::new(globs).map_err(|e| DispatchError::Failed(format!("{e:#}")))?;
    let candidates = collect_matching_files(fs, root, &patterns)
        .map_err(|e| DispatchError::Failed(format!("{e:#}")))?;
    debug!(trigger = %trigger_id, candidates = candidates.len(), "matched result files");

    select_latest_file(fs, root, &candidates)
        .ok_or_else(|| DispatchError::NoMatchingFiles(globs.to_vec()))
}

#[derive(Clone)]
pub struct AnalyzeTestResultsHandler {
    vcs: Arc<dyn VcsClient>,
    fs: Arc<dyn FileSystem>,
    repo_root: PathBuf,
    sink: Arc<dyn NotificationSink>,
    pull_before: bool,
}

impl std::fmt::Debug for AnalyzeTestResultsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzeTestResultsHandler")
            .field("repo_root", &self.repo_root)
            .field("sink", &self.sink)
            .field("pull_before", &self.pull_before)
            .finish_non_exhaustive()
    }
}

impl AnalyzeTestResultsHandler {
    pub fn new(
        vcs: Arc<dyn VcsClient>,
        fs: Arc<dyn FileSystem>,
        repo_root: impl Into<PathBuf>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            vcs,
            fs,
            repo_root: repo_root.into(),
            sink,
            pull_before: true,
        }
    }

    pub fn with_pull(mut self, pull_before: bool) -> Self {
        self.pull_before = pull_before;
        self
    }

    async fn analyze(&self, trigger: &TriggerMessage) -> Result<HandlerReport, DispatchError> {
        if self.pull_before {
            let pull = self.vcs.pull().await;
            if !pull.ok {
                return Err(DispatchError::External(format!(
                    "pull failed: {}",
                    pull.output
                )));
            }
            debug!(trigger = %trigger.id, "repository pulled");
        }

        // The walk is synchronous; off the runtime so the dispatcher's timeout
        // can still fire while it runs.
        let fs = Arc::clone(&self.fs);
        let root = self.repo_root.clone();
        let globs = trigger.files_to_check.clone();
        let trigger_id = trigger.id.clone();
        let selected = tokio::task::spawn_blocking(move || {
            find_latest(fs.as_ref(), &root, &globs, &trigger_id)
        })
        .await
        .map_err(|e| DispatchError::Failed(format!("result file search aborted: {e}")))??;

        let notification = AnalysisReady {
            trigger_id: trigger.id.clone(),
            commit_hash: trigger.commit_hash.clone(),
            commit_message: trigger.commit_message.clone(),
            file: selected.relative.clone(),
            timestamp: trigger.timestamp,
            timezone: trigger.timezone,
            priority: trigger.priority,
        };
        self.sink
            .emit(&notification)
            .map_err(|e| DispatchError::Failed(format!("notification sink: {e:#}")))?;

        info!(trigger = %trigger.id, file = %selected.relative, "analysis ready");
        Ok(HandlerReport {
            detail: format!("selected {}", selected.relative),
        })
    }
}

impl ActionHandler for AnalyzeTestResultsHandler {
    fn handle<'a>(
        &'a self,
        trigger: &'a TriggerMessage,
    ) -> BoxFuture<'a, Result<HandlerReport, DispatchError>> {
        Box::pin(self.analyze(trigger))
    }
}
