// src/watch/poller.rs

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::archive::{ArchivalStore, ArchiveRecord, RecordResult};
use crate::config::model::ExchangeConfig;
use crate::dispatch::ActionDispatcher;
use crate::errors::{io_failure, Result, TriggerdError};
use crate::fs::FileSystem;
use crate::shutdown::Shutdown;
use crate::telemetry::{MetricsOwner, PerformanceMetrics};
use crate::trigger::{artifact_id, parse_trigger, unique_artifact_id, ParseFailure};
use crate::watch::patterns::FilePatterns;
use crate::watch::seen::{ArtifactIdentity, SeenSet};
use crate::watch::wake::WakeStrategy;

pub const WATCHER_COMPONENT: &str = "watcher";

/// What one poll pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// New identities found in the trigger directory.
    pub discovered: usize,
    pub archived: usize,
    pub error_archived: usize,
    /// Artifacts another consumer claimed first.
    pub claim_lost: usize,
    /// Earlier archive moves that succeeded this pass.
    pub retried_archives: usize,
    /// Artifacts still waiting in `processing/` for their archive move.
    pub pending_archives: usize,
    /// Claimed artifacts whose contents could not be read yet.
    pub deferred_reads: usize,
    pub list_failed: bool,
}

/// What startup recovery did with leftovers in `processing/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Already had a record; archive move completed.
    pub completed: usize,
    /// Moved back into the trigger directory for reprocessing.
    pub requeued: usize,
}

/// An artifact whose record exists but whose move into the archive failed.
#[derive(Debug, Clone)]
struct PendingArchive {
    artifact: PathBuf,
    record: ArchiveRecord,
}

/// Claims, validates, dispatches and archives trigger artifacts.
pub struct DirectoryWatcher {
    fs: Arc<dyn FileSystem>,
    exchange: ExchangeConfig,
    pattern: FilePatterns,
    dispatcher: ActionDispatcher,
    archive: ArchivalStore,
    seen: SeenSet,
    pending: Vec<PendingArchive>,
    /// Claimed artifacts (id, path in `processing/`) to read again next pass.
    unread: Vec<(String, PathBuf)>,
    metrics: MetricsOwner,
    recover_in_flight: bool,
}

impl DirectoryWatcher {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        exchange: ExchangeConfig,
        dispatcher: ActionDispatcher,
    ) -> Result<Self> {
        let pattern = FilePatterns::new(std::slice::from_ref(&exchange.pattern))
            .map_err(|e| TriggerdError::ConfigError(format!("trigger pattern: {e:#}")))?;
        let archive = ArchivalStore::new(Arc::clone(&fs), exchange.clone());
        Ok(Self {
            fs,
            exchange,
            pattern,
            dispatcher,
            archive,
            seen: SeenSet::new(),
            pending: Vec::new(),
            unread: Vec::new(),
            metrics: MetricsOwner::new(WATCHER_COMPONENT),
            recover_in_flight: true,
        })
    }

    pub fn with_recovery(mut self, recover_in_flight: bool) -> Self {
        self.recover_in_flight = recover_in_flight;
        self
    }

    pub fn archive(&self) -> &ArchivalStore {
        &self.archive
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PerformanceMetrics> {
        self.metrics.subscribe()
    }

    pub fn pending_archives(&self) -> usize {
        self.pending.len()
    }

    /// Create the exchange directories and recover in-flight artifacts.
    ///
    /// Failing to create a directory is fatal.
    pub fn start(&mut self) -> Result<RecoveryReport> {
        for dir in [&self.exchange.trigger_dir, &self.exchange.processing_dir()] {
            self.fs.create_dir_all(dir).map_err(io_failure)?;
        }
        self.archive.ensure_dirs()?;

        let report = if self.recover_in_flight {
            self.recover()?
        } else {
            RecoveryReport::default()
        };

        info!(
            dir = ?self.exchange.trigger_dir,
            pattern = %self.exchange.pattern,
            mode = ?self.exchange.mode,
            completed = report.completed,
            requeued = report.requeued,
            "directory watcher started"
        );
        Ok(report)
    }

    fn recover(&mut self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let processing = self.exchange.processing_dir();

        let mut leftovers = self.list_json_files(&processing).map_err(io_failure)?;
        leftovers.sort();

        for path in leftovers {
            let id = artifact_id(&path);
            match self.archive.find_record(&id) {
                Ok(Some(record)) => match self.archive.archive(&path, &record) {
                    Ok(_) => report.completed += 1,
                    Err(err) => {
                        warn!(trigger = %id, error = %err, "completing archive failed; will retry");
                        self.pending.push(PendingArchive {
                            artifact: path,
                            record,
                        });
                    }
                },
                Ok(None) => {
                    let back = self.exchange.trigger_dir.join(format!("{id}.json"));
                    match self.fs.rename(&path, &back) {
                        Ok(()) => {
                            info!(trigger = %id, "requeued in-flight artifact");
                            report.requeued += 1;
                        }
                        Err(err) => warn!(trigger = %id, error = %err, "requeue failed"),
                    }
                }
                Err(err) => warn!(trigger = %id, error = %err, "unreadable archive record"),
            }
        }

        Ok(report)
    }

    fn list_json_files(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        Ok(self
            .fs
            .read_dir(dir)?
            .into_iter()
            .filter(|p| self.fs.is_file(p))
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let n = n.to_string_lossy();
                        !n.starts_with('.') && n.ends_with(".json")
                    })
                    .unwrap_or(false)
            })
            .collect())
    }

    fn is_artifact_name(&self, name: &str) -> bool {
        !name.starts_with('.')
            && (self.pattern.matches(name) || name == self.exchange.mailbox_file)
    }

    /// Current artifacts in the trigger directory, sorted by file name.
    fn list_artifacts(&self) -> anyhow::Result<Vec<(PathBuf, ArtifactIdentity)>> {
        let mut found = Vec::new();
        for path in self.fs.read_dir(&self.exchange.trigger_dir)? {
            if !self.fs.is_file(&path) {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !self.is_artifact_name(&name) {
                continue;
            }
            // Gone between listing and stat: someone else took it.
            let Ok(modified) = self.fs.modified(&path) else {
                continue;
            };
            found.push((
                path,
                ArtifactIdentity {
                    file_name: name,
                    modified,
                },
            ));
        }
        found.sort_by(|a, b| a.1.file_name.cmp(&b.1.file_name));
        Ok(found)
    }

    /// One pass over the trigger directory.
    pub async fn poll_once(&mut self) -> PollReport {
        let mut report = PollReport::default();

        report.retried_archives = self.retry_pending();

        for (id, claimed) in std::mem::take(&mut self.unread) {
            self.process(&id, &claimed, &mut report).await;
        }

        match self.list_artifacts() {
            Ok(artifacts) => {
                let identities: Vec<ArtifactIdentity> =
                    artifacts.iter().map(|(_, id)| id.clone()).collect();
                self.seen.retain_present(&identities);

                for (path, identity) in artifacts {
                    if !self.seen.insert(identity.clone()) {
                        continue;
                    }
                    report.discovered += 1;
                    debug!(file = %identity.file_name, "artifact detected");

                    match self.claim(&path, &identity) {
                        Ok(Some((id, claimed))) => {
                            self.process(&id, &claimed, &mut report).await;
                        }
                        Ok(None) => report.claim_lost += 1,
                        Err(err) => {
                            warn!(file = %identity.file_name, error = %err, "claim failed; will retry");
                            self.seen.forget(&identity);
                        }
                    }
                }
            }
            Err(err) => {
                warn!(dir = ?self.exchange.trigger_dir, error = %err, "listing trigger directory failed");
                report.list_failed = true;
            }
        }

        report.pending_archives = self.pending.len();
        report.deferred_reads = self.unread.len();
        self.metrics.mark_health_check();
        self.metrics.publish();
        report
    }

    /// Rename into `processing/`. `Ok(None)` means another consumer won.
    fn claim(
        &self,
        path: &Path,
        identity: &ArtifactIdentity,
    ) -> io::Result<Option<(String, PathBuf)>> {
        let id = if identity.file_name == self.exchange.mailbox_file {
            unique_artifact_id(Utc::now())
        } else {
            artifact_id(path)
        };
        let claimed = self.exchange.processing_dir().join(format!("{id}.json"));

        match self.fs.rename(path, &claimed) {
            Ok(()) => {
                debug!(trigger = %id, "artifact claimed");
                Ok(Some((id, claimed)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound && !self.fs.exists(path) => {
                debug!(trigger = %id, "artifact claimed by another consumer");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn process(&mut self, id: &str, claimed: &Path, report: &mut PollReport) {
        let started = Instant::now();

        let record = match self.fs.read_to_string(claimed) {
            Err(err) => {
                warn!(trigger = %id, error = %err, "reading claimed artifact failed; will retry next pass");
                self.unread.push((id.to_string(), claimed.to_path_buf()));
                return;
            }
            Ok(contents) => match parse_trigger(id, &contents) {
                Err(ParseFailure::Malformed(error)) => {
                    warn!(trigger = %id, %error, "malformed artifact");
                    ArchiveRecord::rejected(id, Some(contents), RecordResult::Malformed { error })
                }
                Err(ParseFailure::Invalid(errors)) => {
                    for e in errors.iter() {
                        warn!(trigger = %id, field = %e.field, reason = %e.reason, "validation failed");
                    }
                    ArchiveRecord::rejected(
                        id,
                        Some(contents),
                        RecordResult::ValidationFailed {
                            errors: errors.iter().cloned().collect(),
                        },
                    )
                }
                Ok(trigger) => {
                    info!(
                        trigger = %id,
                        action = %trigger.action,
                        priority = %trigger.priority,
                        commit = %trigger.short_hash(),
                        "processing trigger"
                    );
                    let result = match self.dispatcher.dispatch(&trigger).await {
                        Ok(handled) => RecordResult::Handled {
                            detail: handled.detail,
                        },
                        Err(err) => {
                            warn!(trigger = %id, action = %trigger.action, error = %err, "handler failed");
                            RecordResult::HandlerFailed {
                                error: err.to_string(),
                            }
                        }
                    };
                    ArchiveRecord::for_trigger(&trigger, result)
                }
            },
        };

        let succeeded = matches!(record.result, RecordResult::Handled { .. });
        if succeeded {
            self.metrics.record_success(started.elapsed());
            report.archived += 1;
        } else {
            self.metrics.record_failure(started.elapsed());
            report.error_archived += 1;
        }

        if let Err(err) = self.archive.archive(claimed, &record) {
            warn!(trigger = %id, error = %err, "archiving failed; will retry next pass");
            self.pending.push(PendingArchive {
                artifact: claimed.to_path_buf(),
                record,
            });
        }
    }

    fn retry_pending(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let before = self.pending.len();
        let archive = &self.archive;
        self.pending.retain(|p| match archive.archive(&p.artifact, &p.record) {
            Ok(_) => false,
            Err(err) => {
                debug!(trigger = %p.record.id, error = %err, "archive retry failed");
                true
            }
        });
        let retried = before - self.pending.len();
        if retried > 0 {
            info!(retried, remaining = self.pending.len(), "pending archives completed");
        }
        retried
    }

    /// Poll until shutdown. Shutdown interrupts only the wait between passes.
    pub async fn run(&mut self, mut wake: Box<dyn WakeStrategy>, shutdown: &Shutdown) {
        while !shutdown.is_requested() {
            let report = self.poll_once().await;
            if report.discovered > 0 || report.retried_archives > 0 {
                debug!(?report, "poll pass finished");
            }

            tokio::select! {
                _ = shutdown.requested() => break,
                _ = wake.wait() => {}
            }
        }
        info!("directory watcher stopped");
    }
}
