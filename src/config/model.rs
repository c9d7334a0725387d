// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::trigger::{Source, TemplateRegistry, Timezone};
use crate::types::{ExchangeMode, SinkKind, WakeStrategyKind};

pub const DEFAULT_TRIGGER_DIR: &str = "triggers";
pub const DEFAULT_TRIGGER_PATTERN: &str = "trigger-*.json";
pub const DEFAULT_MAILBOX_FILE: &str = "trigger.json";
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SKIP_MARKER: &str = "[skip trigger]";
pub const DEFAULT_COMMIT_TEMPLATE: &str = "test_results";
pub const DEFAULT_TELEMETRY_DIR: &str = "telemetry";
pub const DEFAULT_PERFORMANCE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [exchange]
/// trigger_dir = "triggers"
/// mode = "queue"
/// timezone = "ET"
///
/// [watcher]
/// poll_interval = "2s"
/// strategy = "notify"
///
/// [commits]
/// poll_interval = "30s"
/// files_to_check = ["test_results/**/*.json"]
///
/// [commits.build]
/// command = "cargo test"
/// timeout = "20m"
///
/// [notify]
/// sink = "log"
/// path = "analysis-ready.jsonl"
///
/// [template.nightly]
/// action = "analyze_test_results"
/// priority = "low"
/// files_to_check = ["nightly/**/*.json"]
/// ```
///
/// Every section and field is optional. Durations are strings such as
/// `"500ms"`, `"2s"`, `"5m"` or `"1h"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub exchange: RawExchangeSection,
    #[serde(default)]
    pub watcher: RawWatcherSection,
    #[serde(default)]
    pub commits: RawCommitsSection,
    #[serde(default)]
    pub notify: RawNotifySection,
    #[serde(default)]
    pub telemetry: RawTelemetrySection,
    /// Extra or overriding templates from `[template.<name>]`.
    #[serde(default)]
    pub template: BTreeMap<String, RawTemplate>,
}

/// `[exchange]` section: where producer and consumer meet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExchangeSection {
    pub trigger_dir: Option<PathBuf>,
    /// Glob matched against file names in `trigger_dir`.
    pub pattern: Option<String>,
    #[serde(default)]
    pub mode: ExchangeMode,
    pub mailbox_file: Option<String>,
    /// `ET`, `CT`, `MT`, `PT` or `UTC`.
    pub timezone: Option<String>,
}

/// `[watcher]` section for the directory watcher daemon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWatcherSection {
    pub poll_interval: Option<String>,
    #[serde(default)]
    pub strategy: WakeStrategyKind,
    pub handler_timeout: Option<String>,
    pub recover_in_flight: Option<bool>,
    /// Repository the analyze handler pulls and searches.
    pub repo_path: Option<PathBuf>,
    pub pull_before_analysis: Option<bool>,
}

/// `[commits]` section for the commit watcher daemon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommitsSection {
    pub poll_interval: Option<String>,
    pub repo_path: Option<PathBuf>,
    #[serde(default)]
    pub files_to_check: Vec<String>,
    pub template: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub trigger_on_start: bool,
    pub skip_marker: Option<String>,
    pub backoff_max: Option<String>,
    pub build: Option<RawBuildSection>,
}

/// `[commits.build]`: optional build/test step run before writing a trigger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildSection {
    pub command: String,
    /// Process names terminated before the build starts.
    #[serde(default)]
    pub stop_processes: Vec<String>,
    #[serde(default)]
    pub force_stop: bool,
    pub timeout: Option<String>,
}

/// `[notify]` section: where "analysis ready" notifications go.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNotifySection {
    #[serde(default)]
    pub sink: SinkKind,
    pub path: Option<PathBuf>,
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTelemetrySection {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub performance_interval: Option<String>,
    pub health_interval: Option<String>,
    pub retention_days: Option<u32>,
}

/// `[template.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTemplate {
    #[serde(default)]
    pub description: String,
    pub action: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub files_to_check: Vec<String>,
}

/// Validated configuration. Built once at startup and passed by value or
/// reference into every component; nothing reads configuration globally.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub exchange: ExchangeConfig,
    pub watcher: WatcherConfig,
    pub commits: CommitsConfig,
    pub notify: NotifyConfig,
    pub telemetry: TelemetryConfig,
    pub templates: TemplateRegistry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub trigger_dir: PathBuf,
    pub pattern: String,
    pub mode: ExchangeMode,
    pub mailbox_file: String,
    pub timezone: Timezone,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            trigger_dir: PathBuf::from(DEFAULT_TRIGGER_DIR),
            pattern: DEFAULT_TRIGGER_PATTERN.to_string(),
            mode: ExchangeMode::default(),
            mailbox_file: DEFAULT_MAILBOX_FILE.to_string(),
            timezone: Timezone::default(),
        }
    }
}

impl ExchangeConfig {
    /// Exchange rooted at `trigger_dir` with every other field defaulted.
    pub fn at(trigger_dir: impl Into<PathBuf>) -> Self {
        Self {
            trigger_dir: trigger_dir.into(),
            ..Self::default()
        }
    }

    /// Claimed artifacts live here while they are being handled.
    pub fn processing_dir(&self) -> PathBuf {
        self.trigger_dir.join("processing")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.trigger_dir.join("archive")
    }

    pub fn error_archive_dir(&self) -> PathBuf {
        self.archive_dir().join("error")
    }

    pub fn mailbox_path(&self) -> PathBuf {
        self.trigger_dir.join(&self.mailbox_file)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub strategy: WakeStrategyKind,
    pub handler_timeout: Duration,
    pub recover_in_flight: bool,
    pub repo_path: PathBuf,
    pub pull_before_analysis: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_WATCH_INTERVAL,
            strategy: WakeStrategyKind::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            recover_in_flight: true,
            repo_path: PathBuf::from("."),
            pull_before_analysis: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitsConfig {
    pub poll_interval: Duration,
    pub repo_path: PathBuf,
    pub files_to_check: Vec<String>,
    pub template: Option<String>,
    pub source: Source,
    pub trigger_on_start: bool,
    pub skip_marker: Option<String>,
    pub backoff_max: Duration,
    pub build: Option<BuildConfig>,
}

impl Default for CommitsConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_COMMIT_INTERVAL,
            repo_path: PathBuf::from("."),
            files_to_check: Vec::new(),
            template: Some(DEFAULT_COMMIT_TEMPLATE.to_string()),
            source: Source::Automated,
            trigger_on_start: false,
            skip_marker: Some(DEFAULT_SKIP_MARKER.to_string()),
            backoff_max: DEFAULT_BACKOFF_MAX,
            build: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub command: String,
    pub stop_processes: Vec<String>,
    pub force_stop: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyConfig {
    pub sink: SinkKind,
    /// Log file (`sink = "log"`) or directory (`sink = "queue"`).
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub performance_interval: Duration,
    pub health_interval: Duration,
    pub retention_days: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(DEFAULT_TELEMETRY_DIR),
            performance_interval: DEFAULT_PERFORMANCE_INTERVAL,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl ConfigFile {
    /// Defaults plus the built-in templates.
    pub fn with_defaults() -> Self {
        Self {
            templates: TemplateRegistry::builtin(),
            ..Self::default()
        }
    }

    /// Make every relative path absolute against `root`
    /// (normally the directory holding the config file).
    pub fn resolve_paths(&mut self, root: &Path) {
        resolve(&mut self.exchange.trigger_dir, root);
        resolve(&mut self.watcher.repo_path, root);
        resolve(&mut self.commits.repo_path, root);
        resolve(&mut self.telemetry.dir, root);
        if let Some(path) = self.notify.path.as_mut() {
            resolve(path, root);
        }
    }
}

fn resolve(path: &mut PathBuf, root: &Path) {
    if path.is_relative() {
        *path = root.join(&*path);
    }
}
