#![allow(dead_code)]

//! Scriptable stand-ins for the external collaborators.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use triggerd::dispatch::{ActionHandler, AnalysisReady, DispatchError, HandlerReport, NotificationSink};
use triggerd::errors::TriggerdError;
use triggerd::exec::{BoxFuture, BuildInvoker, CommandOutput, ProcessTable, PullOutcome, VcsClient};
use triggerd::fs::FileSystem;
use triggerd::telemetry::{SystemGauges, SystemProbe};
use triggerd::trigger::TriggerMessage;

#[derive(Debug, Default)]
struct FakeVcsState {
    head: String,
    message: String,
    failing_pulls: u32,
    pulls: u32,
}

/// In-memory repository: a HEAD, its message and scripted pull failures.
#[derive(Debug, Clone, Default)]
pub struct FakeVcs {
    state: Arc<Mutex<FakeVcsState>>,
}

impl FakeVcs {
    pub fn new(head: &str, message: &str) -> Self {
        let vcs = Self::default();
        vcs.commit(head, message);
        vcs
    }

    /// Move HEAD to a new commit.
    pub fn commit(&self, head: &str, message: &str) {
        let mut s = self.state.lock().unwrap();
        s.head = head.to_string();
        s.message = message.to_string();
    }

    /// The next `n` pulls fail.
    pub fn fail_pulls(&self, n: u32) {
        self.state.lock().unwrap().failing_pulls = n;
    }

    pub fn pulls(&self) -> u32 {
        self.state.lock().unwrap().pulls
    }
}

impl VcsClient for FakeVcs {
    fn pull(&self) -> BoxFuture<'_, PullOutcome> {
        let mut s = self.state.lock().unwrap();
        s.pulls += 1;
        let outcome = if s.failing_pulls > 0 {
            s.failing_pulls -= 1;
            PullOutcome {
                ok: false,
                output: "fatal: unable to access remote".to_string(),
            }
        } else {
            PullOutcome {
                ok: true,
                output: "Already up to date.".to_string(),
            }
        };
        Box::pin(async move { outcome })
    }

    fn head_commit(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        let head = self.state.lock().unwrap().head.clone();
        Box::pin(async move { Ok(head) })
    }

    fn last_commit_message(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        let message = self.state.lock().unwrap().message.clone();
        Box::pin(async move { Ok(message) })
    }
}

/// Keeps every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<AnalysisReady>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<AnalysisReady> {
        self.received.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: &AnalysisReady) -> anyhow::Result<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Always reports the same gauges.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub SystemGauges);

impl SystemProbe for FixedProbe {
    fn sample(&self) -> SystemGauges {
        self.0
    }
}

/// Handler that counts invocations per trigger id.
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    calls: Arc<Mutex<HashMap<String, u32>>>,
    fail_with: Option<DispatchError>,
    delay: Option<Duration>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: DispatchError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

impl ActionHandler for CountingHandler {
    fn handle<'a>(
        &'a self,
        trigger: &'a TriggerMessage,
    ) -> BoxFuture<'a, Result<HandlerReport, DispatchError>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(trigger.id.clone())
            .or_insert(0) += 1;
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(HandlerReport {
                    detail: format!("counted {}", trigger.id),
                }),
            }
        })
    }
}

/// Build invoker returning a canned result and recording the commands it ran.
#[derive(Debug, Clone)]
pub struct FakeBuild {
    exit_code: Option<i32>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeBuild {
    pub fn exiting(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            commands: Arc::default(),
        }
    }

    /// Every run fails as if the command could not be spawned.
    pub fn unspawnable() -> Self {
        Self {
            exit_code: None,
            commands: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl BuildInvoker for FakeBuild {
    fn run(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> BoxFuture<'_, triggerd::errors::Result<CommandOutput>> {
        self.commands.lock().unwrap().push(command.to_string());
        let result = match self.exit_code {
            Some(code) => Ok(CommandOutput {
                exit_code: code,
                stdout: "3 tests run".to_string(),
                stderr: if code == 0 {
                    String::new()
                } else {
                    "1 test failed".to_string()
                },
            }),
            None => Err(TriggerdError::ExternalProcess(format!(
                "spawning process '{command}': not found"
            ))),
        };
        Box::pin(async move { result })
    }
}

/// Process table with fixed pids per name.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    pids: HashMap<String, Vec<u32>>,
    terminated: Arc<Mutex<Vec<(u32, bool)>>>,
}

impl FakeProcessTable {
    pub fn with_process(mut self, name: &str, pid: u32) -> Self {
        self.pids.entry(name.to_string()).or_default().push(pid);
        self
    }

    pub fn terminated(&self) -> Vec<(u32, bool)> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn find_processes_by_name(&self, name: &str) -> BoxFuture<'_, anyhow::Result<Vec<u32>>> {
        let pids = self.pids.get(name).cloned().unwrap_or_default();
        Box::pin(async move { Ok(pids) })
    }

    fn terminate(&self, pid: u32, force: bool) -> BoxFuture<'_, bool> {
        self.terminated.lock().unwrap().push((pid, force));
        Box::pin(async move { true })
    }
}

/// Filesystem whose directory listings block the calling thread, like a
/// slow network mount.
#[derive(Debug, Clone)]
pub struct SlowFileSystem {
    inner: Arc<dyn FileSystem>,
    read_dir_delay: Duration,
}

impl SlowFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>, read_dir_delay: Duration) -> Self {
        Self {
            inner,
            read_dir_delay,
        }
    }
}

impl FileSystem for SlowFileSystem {
    fn read_to_string(&self, path: &Path) -> anyhow::Result<String> {
        self.inner.read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.write_atomic(path, contents)
    }

    fn append(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        self.inner.append(path, contents)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn modified(&self, path: &Path) -> anyhow::Result<SystemTime> {
        self.inner.modified(path)
    }

    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        std::thread::sleep(self.read_dir_delay);
        self.inner.read_dir(path)
    }
}
