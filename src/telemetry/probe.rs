// src/telemetry/probe.rs

//! Host gauges: disk via `fs2`, memory and CPU from `/proc`.
//!
//! Anything unavailable on the current platform is reported as unknown
//! (`None`), with one warning per gauge.

use std::path::PathBuf;
use std::sync::Once;

use tracing::{debug, warn};

use super::SystemGauges;

pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemGauges;
}

#[derive(Debug, Clone)]
pub struct HostProbe {
    /// Filesystem whose free space is reported.
    disk_path: PathBuf,
}

impl HostProbe {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
        }
    }

    fn disk_free_pct(&self) -> Option<f64> {
        static WARNED: Once = Once::new();

        let available = fs2::available_space(&self.disk_path);
        let total = fs2::total_space(&self.disk_path);
        match (available, total) {
            (Ok(available), Ok(total)) if total > 0 => {
                Some(available as f64 / total as f64 * 100.0)
            }
            (a, t) => {
                debug!(path = ?self.disk_path, available = ?a.err(), total = ?t.err(), "disk space unavailable");
                WARNED.call_once(|| {
                    warn!(path = ?self.disk_path, "disk free space unavailable; reporting it as unknown")
                });
                None
            }
        }
    }
}

impl SystemProbe for HostProbe {
    fn sample(&self) -> SystemGauges {
        static MEMORY_WARNED: Once = Once::new();
        static CPU_WARNED: Once = Once::new();

        SystemGauges {
            disk_free_pct: self.disk_free_pct(),
            memory_used_pct: known_or_warn(
                read_proc("/proc/meminfo").and_then(|s| memory_used_pct(&s)),
                "memory",
                &MEMORY_WARNED,
            ),
            cpu_pct: known_or_warn(
                read_proc("/proc/loadavg").and_then(|s| cpu_pct_from_loadavg(&s, cpu_count())),
                "cpu",
                &CPU_WARNED,
            ),
        }
    }
}

fn known_or_warn(value: Option<f64>, gauge: &'static str, warned: &Once) -> Option<f64> {
    if value.is_none() {
        warned.call_once(|| warn!(gauge, "host gauge unavailable; reporting it as unknown"));
    }
    value
}

fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_kb_value(val: &str) -> Option<u64> {
    val.split_whitespace().next()?.parse().ok()
}

/// `(MemTotal - MemAvailable) / MemTotal` from `/proc/meminfo` contents.
pub fn memory_used_pct(meminfo: &str) -> Option<f64> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(val) = line.strip_prefix("MemTotal:") {
            total = parse_kb_value(val);
        } else if let Some(val) = line.strip_prefix("MemAvailable:") {
            available = parse_kb_value(val);
        }
    }
    let (total, available) = (total?, available?);
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}

/// 1-minute load average divided by the CPU count, capped at 100.
pub fn cpu_pct_from_loadavg(loadavg: &str, cpus: usize) -> Option<f64> {
    let load: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    Some((load / cpus.max(1) as f64 * 100.0).min(100.0))
}
