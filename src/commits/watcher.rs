// src/commits/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::model::{BuildConfig, CommitsConfig};
use crate::errors::Result;
use crate::exec::{BuildInvoker, ProcessTable, VcsClient};
use crate::shutdown::Shutdown;
use crate::telemetry::{MetricsOwner, PerformanceMetrics};
use crate::trigger::schema::{MAX_COMMIT_MESSAGE_CHARS, MAX_CUSTOM_DATA_CHARS};
use crate::trigger::{TriggerRequest, TriggerWriter};

use super::backoff::Backoff;
use super::classify::classify;

pub const COMMITS_COMPONENT: &str = "commits";

/// What one commit poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPoll {
    PullFailed { retry_in: Duration },
    /// HEAD could not be read after a successful pull.
    HeadUnavailable(String),
    Unchanged,
    /// First observation; recorded without a trigger.
    Baseline(String),
    /// Message carried the skip marker.
    Skipped(String),
    Triggered { commit: String, path: PathBuf },
    /// The commit stays unseen and is retried next pass.
    TriggerFailed { commit: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Commits that produced a trigger.
    pub total_commits: u64,
    pub skipped: u64,
    pub pull_failures: u64,
}

/// Turns new commits into triggers.
pub struct CommitWatcher {
    cfg: CommitsConfig,
    vcs: Arc<dyn VcsClient>,
    writer: TriggerWriter,
    processes: Arc<dyn ProcessTable>,
    builder: Arc<dyn BuildInvoker>,
    last_seen: Option<String>,
    backoff: Backoff,
    stats: CommitStats,
    metrics: MetricsOwner,
}

impl CommitWatcher {
    pub fn new(
        cfg: CommitsConfig,
        vcs: Arc<dyn VcsClient>,
        writer: TriggerWriter,
        processes: Arc<dyn ProcessTable>,
        builder: Arc<dyn BuildInvoker>,
    ) -> Self {
        let backoff = Backoff::new(cfg.poll_interval, cfg.backoff_max);
        Self {
            cfg,
            vcs,
            writer,
            processes,
            builder,
            last_seen: None,
            backoff,
            stats: CommitStats::default(),
            metrics: MetricsOwner::new(COMMITS_COMPONENT),
        }
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PerformanceMetrics> {
        self.metrics.subscribe()
    }

    fn mark_seen(&mut self, commit: &str) {
        self.last_seen = Some(commit.to_string());
        self.metrics.set_last_seen_commit(commit);
    }

    pub async fn poll_once(&mut self) -> CommitPoll {
        let outcome = self.poll_inner().await;
        self.metrics.mark_health_check();
        self.metrics.publish();
        outcome
    }

    async fn poll_inner(&mut self) -> CommitPoll {
        let pull = self.vcs.pull().await;
        if !pull.ok {
            self.stats.pull_failures += 1;
            let retry_in = self.backoff.fail();
            warn!(
                failures = self.backoff.failures(),
                retry_in = ?retry_in,
                output = %pull.output,
                "pull failed; backing off"
            );
            return CommitPoll::PullFailed { retry_in };
        }
        self.backoff.reset();

        let head = match self.vcs.head_commit().await {
            Ok(head) => head,
            Err(err) => {
                warn!(error = %err, "reading HEAD failed");
                return CommitPoll::HeadUnavailable(format!("{err:#}"));
            }
        };

        if self.last_seen.is_none() && !self.cfg.trigger_on_start {
            info!(commit = %head, "baseline commit recorded");
            self.mark_seen(&head);
            return CommitPoll::Baseline(head);
        }
        if self.last_seen.as_deref() == Some(head.as_str()) {
            debug!(commit = %head, "no new commit");
            return CommitPoll::Unchanged;
        }

        let started = Instant::now();
        match self.trigger_for(&head).await {
            Ok(Some(path)) => {
                self.mark_seen(&head);
                self.stats.total_commits += 1;
                self.metrics.record_success(started.elapsed());
                CommitPoll::Triggered { commit: head, path }
            }
            Ok(None) => {
                self.mark_seen(&head);
                self.stats.skipped += 1;
                CommitPoll::Skipped(head)
            }
            Err(err) => {
                self.metrics.record_failure(started.elapsed());
                warn!(commit = %head, error = %err, "trigger for commit failed; will retry");
                CommitPoll::TriggerFailed {
                    commit: head,
                    error: err.to_string(),
                }
            }
        }
    }

    /// `Ok(None)` when the commit is skipped.
    async fn trigger_for(&self, head: &str) -> Result<Option<PathBuf>> {
        let message = self.vcs.last_commit_message().await?;
        let message = message.trim();

        if let Some(marker) = self.cfg.skip_marker.as_deref() {
            if message.contains(marker) {
                info!(commit = %head, %marker, "commit skipped");
                return Ok(None);
            }
        }

        let custom_data = match &self.cfg.build {
            Some(build) => self.run_build(build).await?,
            None => None,
        };

        let classification = classify(message);
        info!(
            commit = %head,
            action = %classification.action,
            priority = %classification.priority,
            "commit classified"
        );

        let request = TriggerRequest {
            action: Some(classification.action.to_string()),
            commit_hash: head.to_string(),
            commit_message: truncate_chars(message, MAX_COMMIT_MESSAGE_CHARS),
            files_to_check: self.cfg.files_to_check.clone(),
            priority: Some(classification.priority.to_string()),
            source: Some(self.cfg.source.to_string()),
            custom_data,
            template: self.cfg.template.clone(),
        };
        let written = self.writer.write(&request)?;
        Ok(Some(written.path))
    }

    /// Stop configured processes and run the build. A non-zero exit comes
    /// back as custom data for the trigger.
    async fn run_build(&self, build: &BuildConfig) -> Result<Option<String>> {
        for name in &build.stop_processes {
            match self.processes.find_processes_by_name(name).await {
                Ok(pids) => {
                    for pid in pids {
                        if !self.processes.terminate(pid, build.force_stop).await {
                            warn!(process = %name, pid, "process did not stop");
                        }
                    }
                }
                Err(err) => warn!(process = %name, error = %err, "process lookup failed"),
            }
        }

        info!(command = %build.command, timeout = ?build.timeout, "running build");
        let output = self.builder.run(&build.command, build.timeout).await?;
        if output.success() {
            return Ok(None);
        }

        warn!(command = %build.command, exit_code = output.exit_code, "build failed");
        let summary = format!(
            "build `{}` exited with {}: {}",
            build.command,
            output.exit_code,
            output.combined()
        );
        Ok(Some(truncate_chars(&summary, MAX_CUSTOM_DATA_CHARS)))
    }

    /// Poll until shutdown. A failed pull waits for the backoff delay instead
    /// of the poll interval.
    pub async fn run(&mut self, shutdown: &Shutdown) {
        info!(
            repo = ?self.cfg.repo_path,
            interval = ?self.cfg.poll_interval,
            "commit watcher started"
        );
        while !shutdown.is_requested() {
            let delay = match self.poll_once().await {
                CommitPoll::PullFailed { retry_in } => retry_in,
                _ => self.cfg.poll_interval,
            };

            tokio::select! {
                _ = shutdown.requested() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(stats = ?self.stats, "commit watcher stopped");
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
