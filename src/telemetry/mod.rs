// src/telemetry/mod.rs

//! Performance counters, health gauges and the recorder task that samples
//! them.
//!
//! A daemon owns one [`MetricsOwner`] and is the only writer of its
//! counters. Every change is published as a whole [`PerformanceMetrics`]
//! snapshot over a `watch` channel; the recorder only ever reads its own
//! copy.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub mod probe;
pub mod recorder;

pub use probe::{HostProbe, SystemProbe};
pub use recorder::{RollingLog, TelemetryRecorder};

pub const MIN_DISK_FREE_PCT: f64 = 10.0;
pub const MAX_MEMORY_USED_PCT: f64 = 90.0;
pub const MAX_CPU_PCT: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub component: String,
    pub total_triggers: u64,
    pub successful: u64,
    pub failed: u64,
    /// Running mean over every completed trigger.
    pub average_response_time_ms: f64,
    pub uptime_secs: u64,
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_commit: Option<String>,
}

impl PerformanceMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            total_triggers: 0,
            successful: 0,
            failed: 0,
            average_response_time_ms: 0.0,
            uptime_secs: 0,
            last_health_check: None,
            last_seen_commit: None,
        }
    }
}

/// Host resource gauges, all percentages in `0.0..=100.0`.
///
/// `None` means the gauge could not be read on this host and serializes as
/// `null`. An unknown gauge never fails the health check on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemGauges {
    pub disk_free_pct: Option<f64>,
    pub memory_used_pct: Option<f64>,
    pub cpu_pct: Option<f64>,
}

impl SystemGauges {
    pub fn is_healthy(&self) -> bool {
        self.disk_free_pct.is_none_or(|d| d > MIN_DISK_FREE_PCT)
            && self.memory_used_pct.is_none_or(|m| m < MAX_MEMORY_USED_PCT)
            && self.cpu_pct.is_none_or(|c| c < MAX_CPU_PCT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    #[serde(flatten)]
    pub gauges: SystemGauges,
    pub is_healthy: bool,
    pub uptime_secs: u64,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn new(metrics: &PerformanceMetrics, gauges: SystemGauges) -> Self {
        Self {
            timestamp: Utc::now(),
            component: metrics.component.clone(),
            gauges,
            is_healthy: gauges.is_healthy(),
            uptime_secs: metrics.uptime_secs,
            last_health_check: metrics.last_health_check,
        }
    }
}

/// Single writer of a component's counters.
#[derive(Debug)]
pub struct MetricsOwner {
    metrics: PerformanceMetrics,
    started: Instant,
    tx: watch::Sender<PerformanceMetrics>,
}

impl MetricsOwner {
    pub fn new(component: impl Into<String>) -> Self {
        let metrics = PerformanceMetrics::new(component);
        let (tx, _rx) = watch::channel(metrics.clone());
        Self {
            metrics,
            started: Instant::now(),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PerformanceMetrics> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        let mut snapshot = self.metrics.clone();
        snapshot.uptime_secs = self.started.elapsed().as_secs();
        snapshot
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.metrics.successful += 1;
        self.record_completion(elapsed);
    }

    pub fn record_failure(&mut self, elapsed: Duration) {
        self.metrics.failed += 1;
        self.record_completion(elapsed);
    }

    fn record_completion(&mut self, elapsed: Duration) {
        let m = &mut self.metrics;
        m.total_triggers += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        m.average_response_time_ms += (sample - m.average_response_time_ms) / m.total_triggers as f64;
    }

    pub fn mark_health_check(&mut self) {
        self.metrics.last_health_check = Some(Utc::now());
    }

    pub fn set_last_seen_commit(&mut self, commit: impl Into<String>) {
        self.metrics.last_seen_commit = Some(commit.into());
    }

    /// Push the current snapshot to every subscriber.
    pub fn publish(&self) {
        // No receivers is fine; telemetry may be disabled.
        self.tx.send_replace(self.snapshot());
    }
}
