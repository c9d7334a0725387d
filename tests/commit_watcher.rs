// tests/commit_watcher.rs

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::MockExchange;
use triggerd::commits::{classify, Backoff, CommitPoll, CommitWatcher};
use triggerd::config::model::{BuildConfig, CommitsConfig};
use triggerd::shutdown::Shutdown;
use triggerd::trigger::{artifact_id, parse_trigger, Action, Priority, TriggerMessage};
use triggerd_test_utils::fakes::{FakeBuild, FakeProcessTable, FakeVcs};
use triggerd_test_utils::{init_tracing, with_timeout};

struct Harness {
    ex: MockExchange,
    vcs: FakeVcs,
    processes: FakeProcessTable,
    build: FakeBuild,
}

impl Harness {
    fn new(head: &str, message: &str) -> Self {
        Self {
            ex: MockExchange::new(),
            vcs: FakeVcs::new(head, message),
            processes: FakeProcessTable::default(),
            build: FakeBuild::exiting(0),
        }
    }

    fn watcher(&self, cfg: CommitsConfig) -> CommitWatcher {
        CommitWatcher::new(
            cfg,
            Arc::new(self.vcs.clone()),
            self.ex.writer(),
            Arc::new(self.processes.clone()),
            Arc::new(self.build.clone()),
        )
    }

    fn trigger_at(&self, path: &Path) -> TriggerMessage {
        parse_trigger(&artifact_id(path), &self.ex.read(path)).unwrap()
    }
}

fn eager() -> CommitsConfig {
    CommitsConfig {
        trigger_on_start: true,
        ..CommitsConfig::default()
    }
}

fn build_cfg() -> BuildConfig {
    BuildConfig {
        command: "cargo test".to_string(),
        stop_processes: vec!["app-server".to_string()],
        force_stop: true,
        timeout: Duration::from_secs(60),
    }
}

fn expect_triggered(poll: CommitPoll) -> std::path::PathBuf {
    match poll {
        CommitPoll::Triggered { path, .. } => path,
        other => panic!("expected a trigger, got {other:?}"),
    }
}

#[tokio::test]
async fn first_head_is_a_baseline_and_later_commits_trigger() {
    init_tracing();
    let h = Harness::new("aaaaaaa1", "initial import");
    let mut watcher = h.watcher(CommitsConfig::default());

    assert_eq!(
        watcher.poll_once().await,
        CommitPoll::Baseline("aaaaaaa1".to_string())
    );
    assert_eq!(watcher.poll_once().await, CommitPoll::Unchanged);
    assert!(h.ex.pending_files().is_empty());

    h.vcs.commit("bbbbbbb2", "URGENT hotfix for crash");
    let path = expect_triggered(watcher.poll_once().await);

    let trigger = h.trigger_at(&path);
    assert_eq!(trigger.action, Action::DeployFixes);
    assert_eq!(trigger.priority, Priority::High);
    assert_eq!(trigger.commit_hash, "bbbbbbb2");
    assert_eq!(trigger.commit_message, "URGENT hotfix for crash");
    assert_eq!(
        trigger.files_to_check,
        vec!["test_results/**/*.json", "test_results/**/*.xml"]
    );
    assert_eq!(
        trigger.metadata.unwrap().template.as_deref(),
        Some("test_results")
    );

    assert_eq!(watcher.last_seen(), Some("bbbbbbb2"));
    assert_eq!(watcher.stats().total_commits, 1);
    assert_eq!(watcher.poll_once().await, CommitPoll::Unchanged);
    assert_eq!(h.ex.pending_files().len(), 1);

    let metrics = watcher.metrics();
    assert_eq!(metrics.successful, 1);
    assert_eq!(metrics.last_seen_commit.as_deref(), Some("bbbbbbb2"));
}

#[tokio::test]
async fn trigger_on_start_fires_for_the_current_head() {
    let h = Harness::new("ccccccc3", "add unit tests for parser");
    let mut watcher = h.watcher(eager());

    let path = expect_triggered(watcher.poll_once().await);
    let trigger = h.trigger_at(&path);
    assert_eq!(trigger.action, Action::RunTests);
    assert_eq!(trigger.priority, Priority::Normal);
    assert!(trigger.custom_data.is_none());
}

#[tokio::test]
async fn skip_marker_suppresses_the_trigger_but_marks_the_commit_seen() {
    let h = Harness::new("ddddddd4", "docs: typo [skip trigger]");
    let mut watcher = h.watcher(eager());

    assert_eq!(
        watcher.poll_once().await,
        CommitPoll::Skipped("ddddddd4".to_string())
    );
    assert_eq!(watcher.poll_once().await, CommitPoll::Unchanged);
    assert!(h.ex.pending_files().is_empty());
    assert_eq!(watcher.stats().skipped, 1);
    assert_eq!(watcher.stats().total_commits, 0);
}

#[tokio::test]
async fn pull_failures_back_off_exponentially_and_reset_on_success() {
    let h = Harness::new("eeeeeee5", "initial import");
    let mut watcher = h.watcher(CommitsConfig {
        poll_interval: Duration::from_secs(30),
        backoff_max: Duration::from_secs(300),
        ..CommitsConfig::default()
    });

    h.vcs.fail_pulls(5);
    let mut delays = Vec::new();
    for _ in 0..5 {
        match watcher.poll_once().await {
            CommitPoll::PullFailed { retry_in } => delays.push(retry_in.as_secs()),
            other => panic!("expected pull failure, got {other:?}"),
        }
    }
    assert_eq!(delays, vec![60, 120, 240, 300, 300]);
    assert_eq!(watcher.last_seen(), None);

    assert!(matches!(watcher.poll_once().await, CommitPoll::Baseline(_)));

    h.vcs.fail_pulls(1);
    assert_eq!(
        watcher.poll_once().await,
        CommitPoll::PullFailed {
            retry_in: Duration::from_secs(60)
        }
    );
    assert_eq!(watcher.stats().pull_failures, 6);
}

#[tokio::test]
async fn failed_build_is_reported_in_custom_data() {
    let mut h = Harness::new("fffffff6", "Update integration results");
    h.processes = FakeProcessTable::default().with_process("app-server", 42);
    h.build = FakeBuild::exiting(1);
    let mut watcher = h.watcher(CommitsConfig {
        build: Some(build_cfg()),
        ..eager()
    });

    let path = expect_triggered(watcher.poll_once().await);

    assert_eq!(h.processes.terminated(), vec![(42, true)]);
    assert_eq!(h.build.commands(), vec!["cargo test"]);
    let trigger = h.trigger_at(&path);
    let custom = trigger.custom_data.expect("build failure recorded");
    assert!(custom.contains("exited with 1"), "{custom}");
    assert!(custom.contains("1 test failed"), "{custom}");
}

#[tokio::test]
async fn successful_build_adds_nothing() {
    let h = Harness::new("0000aaa7", "Update integration results");
    let mut watcher = h.watcher(CommitsConfig {
        build: Some(build_cfg()),
        ..eager()
    });

    let path = expect_triggered(watcher.poll_once().await);

    assert!(h.processes.terminated().is_empty());
    assert!(h.trigger_at(&path).custom_data.is_none());
}

#[tokio::test]
async fn build_that_cannot_start_leaves_the_commit_unseen() {
    let mut h = Harness::new("0000bbb8", "Update integration results");
    h.build = FakeBuild::unspawnable();
    let mut watcher = h.watcher(CommitsConfig {
        build: Some(build_cfg()),
        ..eager()
    });

    for _ in 0..2 {
        match watcher.poll_once().await {
            CommitPoll::TriggerFailed { commit, error } => {
                assert_eq!(commit, "0000bbb8");
                assert!(error.contains("cargo test"), "{error}");
            }
            other => panic!("expected trigger failure, got {other:?}"),
        }
        assert_eq!(watcher.last_seen(), None);
    }

    assert_eq!(h.build.commands().len(), 2);
    assert!(h.ex.pending_files().is_empty());
    assert_eq!(watcher.metrics().failed, 2);
}

#[tokio::test]
async fn long_commit_messages_are_truncated_to_fit() {
    let long = format!("Update results {}", "x".repeat(700));
    let h = Harness::new("0000ccc9", &long);
    let mut watcher = h.watcher(eager());

    let path = expect_triggered(watcher.poll_once().await);

    let trigger = h.trigger_at(&path);
    assert_eq!(trigger.commit_message.chars().count(), 500);
    assert!(long.starts_with(&trigger.commit_message));
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let h = Harness::new("0000ddd0", "Update results");
    let mut watcher = h.watcher(CommitsConfig {
        poll_interval: Duration::from_millis(20),
        ..eager()
    });

    let shutdown = Shutdown::new();
    let stopper = shutdown.clone();
    let vcs = h.vcs.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        vcs.commit("0000eee1", "fix flaky deploy");
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.trigger();
    });

    with_timeout(watcher.run(&shutdown)).await;

    assert_eq!(watcher.stats().total_commits, 2);
    assert_eq!(watcher.last_seen(), Some("0000eee1"));
    assert_eq!(h.ex.pending_files().len(), 2);
}

#[test]
fn classification_table() {
    let cases = [
        ("URGENT hotfix for crash", Action::DeployFixes, Priority::High),
        ("add unit tests for parser", Action::RunTests, Priority::Normal),
        ("Run the integration tests", Action::RunTests, Priority::Normal),
        ("urgent test fix", Action::AnalyzeTestResults, Priority::High),
        ("New results from nightly", Action::AnalyzeTestResults, Priority::Normal),
        ("Deploy to staging", Action::DeployFixes, Priority::Normal),
        ("Critical: update dependencies", Action::DeployFixes, Priority::High),
        ("refactor module layout", Action::AnalyzeTestResults, Priority::Normal),
    ];
    for (message, action, priority) in cases {
        let c = classify(message);
        assert_eq!((c.action, c.priority), (action, priority), "{message}");
    }
}

#[test]
fn backoff_caps_and_resets() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
    assert_eq!(backoff.current(), Duration::from_secs(1));
    let delays: Vec<u64> = (0..6).map(|_| backoff.fail().as_secs()).collect();
    assert_eq!(delays, vec![2, 4, 8, 10, 10, 10]);

    for _ in 0..100 {
        backoff.fail();
    }
    assert_eq!(backoff.current(), Duration::from_secs(10));

    backoff.reset();
    assert_eq!(backoff.failures(), 0);
    assert_eq!(backoff.fail(), Duration::from_secs(2));
}
