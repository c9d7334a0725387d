// src/telemetry/recorder.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::model::TelemetryConfig;
use crate::fs::FileSystem;
use crate::shutdown::Shutdown;

use super::probe::SystemProbe;
use super::{HealthSnapshot, PerformanceMetrics};

const LOG_EXTENSION: &str = "jsonl";
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LEN: usize = "YYYY-MM-DD".len();

/// Date-partitioned JSON-lines files: `<dir>/<kind>-<component>-YYYY-MM-DD.jsonl`.
#[derive(Debug, Clone)]
pub struct RollingLog {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    retention_days: u32,
}

impl RollingLog {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            fs,
            dir: dir.into(),
            retention_days,
        }
    }

    pub fn path_for(&self, kind: &str, component: &str, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{kind}-{component}-{}.{LOG_EXTENSION}",
            date.format(DATE_FORMAT)
        ))
    }

    pub fn append<T: Serialize>(
        &self,
        kind: &str,
        component: &str,
        record: &T,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.path_for(kind, component, now.date_naive());
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.fs.append(&path, line.as_bytes())?;
        Ok(path)
    }

    /// Delete partitions older than the retention window. Returns how many
    /// files were removed.
    pub fn prune(&self, today: NaiveDate) -> Result<usize> {
        if !self.fs.is_dir(&self.dir) {
            return Ok(0);
        }
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(self.retention_days)))
        else {
            return Ok(0);
        };

        let mut removed = 0;
        for path in self.fs.read_dir(&self.dir)? {
            match partition_date(&path) {
                Some(date) if date < cutoff => {
                    self.fs.remove_file(&path)?;
                    debug!(path = ?path, "pruned telemetry file");
                    removed += 1;
                }
                _ => {}
            }
        }
        Ok(removed)
    }
}

/// Date suffix of a telemetry file name, if it has one.
fn partition_date(path: &Path) -> Option<NaiveDate> {
    if path.extension()? != LOG_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let split = stem.len().checked_sub(DATE_LEN)?;
    let suffix = stem.get(split..)?;
    NaiveDate::parse_from_str(suffix, DATE_FORMAT).ok()
}

/// Periodically samples the published metrics and host gauges.
pub struct TelemetryRecorder {
    log: RollingLog,
    probe: Arc<dyn SystemProbe>,
    metrics: watch::Receiver<PerformanceMetrics>,
    performance_interval: Duration,
    health_interval: Duration,
    last_pruned: Option<NaiveDate>,
}

impl TelemetryRecorder {
    pub fn new(
        cfg: &TelemetryConfig,
        fs: Arc<dyn FileSystem>,
        probe: Arc<dyn SystemProbe>,
        metrics: watch::Receiver<PerformanceMetrics>,
    ) -> Self {
        Self {
            log: RollingLog::new(fs, cfg.dir.clone(), cfg.retention_days),
            probe,
            metrics,
            performance_interval: cfg.performance_interval,
            health_interval: cfg.health_interval,
            last_pruned: None,
        }
    }

    pub fn record_performance(&mut self) -> Result<PathBuf> {
        let snapshot = self.metrics.borrow_and_update().clone();
        let now = Utc::now();
        self.prune_once_per_day(now.date_naive());
        self.log
            .append("performance", &snapshot.component, &snapshot, now)
    }

    pub fn record_health(&mut self) -> Result<PathBuf> {
        let snapshot = self.metrics.borrow().clone();
        let health = HealthSnapshot::new(&snapshot, self.probe.sample());
        if !health.is_healthy {
            warn!(
                component = %health.component,
                disk_free_pct = ?health.gauges.disk_free_pct,
                memory_used_pct = ?health.gauges.memory_used_pct,
                cpu_pct = ?health.gauges.cpu_pct,
                "host unhealthy"
            );
        }
        self.log
            .append("health", &snapshot.component, &health, health.timestamp)
    }

    fn prune_once_per_day(&mut self, today: NaiveDate) {
        if self.last_pruned == Some(today) {
            return;
        }
        match self.log.prune(today) {
            Ok(removed) => {
                self.last_pruned = Some(today);
                if removed > 0 {
                    info!(removed, "pruned old telemetry files");
                }
            }
            Err(err) => warn!(error = %err, "pruning telemetry failed"),
        }
    }

    /// Record until shutdown. Failures are logged and never stop the loop.
    pub async fn run(mut self, shutdown: Shutdown) {
        let mut performance = tokio::time::interval(self.performance_interval);
        let mut health = tokio::time::interval(self.health_interval);
        performance.set_missed_tick_behavior(MissedTickBehavior::Delay);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = performance.tick() => {
                    if let Err(err) = self.record_performance() {
                        warn!(error = %err, "writing performance record failed");
                    }
                }
                _ = health.tick() => {
                    if let Err(err) = self.record_health() {
                        warn!(error = %err, "writing health record failed");
                    }
                }
            }
        }
        debug!("telemetry recorder stopped");
    }

    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
