// tests/dispatch_analyze.rs

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use triggerd::dispatch::{
    select_latest_file, ActionDispatcher, ActionHandler, AnalysisReady, AnalyzeTestResultsHandler,
    DispatchError, LogFileSink, NotificationSink, QueueDirSink,
};
use triggerd::fs::mock::MockFileSystem;
use triggerd::fs::{FileSystem, RealFileSystem};
use triggerd::trigger::{Action, Priority};
use triggerd::watch::{collect_matching_files, FilePatterns};
use triggerd_test_utils::builders::{TriggerMessageBuilder, SAMPLE_HASH};
use triggerd_test_utils::fakes::{FakeVcs, RecordingSink, SlowFileSystem};

const REPO: &str = "/repo";

struct Fixture {
    mock: MockFileSystem,
    vcs: FakeVcs,
    sink: RecordingSink,
    handler: AnalyzeTestResultsHandler,
}

fn fixture() -> Fixture {
    let mock = MockFileSystem::new();
    mock.add_dir(REPO);
    let vcs = FakeVcs::new(SAMPLE_HASH, "Update test results");
    let sink = RecordingSink::new();
    let handler = AnalyzeTestResultsHandler::new(
        Arc::new(vcs.clone()),
        Arc::new(mock.clone()),
        REPO,
        Arc::new(sink.clone()),
    );
    Fixture {
        mock,
        vcs,
        sink,
        handler,
    }
}

fn patterns(globs: &[&str]) -> FilePatterns {
    let owned: Vec<String> = globs.iter().map(|g| g.to_string()).collect();
    FilePatterns::new(&owned).unwrap()
}

#[test]
fn newest_file_wins_and_ties_go_to_the_greater_path() {
    let mock = MockFileSystem::new();
    mock.add_file_with_mtime("/repo/test_results/a.json", "{}", 100);
    mock.add_file_with_mtime("/repo/test_results/b.json", "{}", 100);
    mock.add_file_with_mtime("/repo/test_results/old.json", "{}", 50);

    let files = collect_matching_files(&mock, Path::new(REPO), &patterns(&["test_results/*.json"])).unwrap();
    assert_eq!(files.len(), 3);

    let selected = select_latest_file(&mock, Path::new(REPO), &files).unwrap();
    assert_eq!(selected.relative, "test_results/b.json");

    mock.add_file_with_mtime("/repo/test_results/new.json", "{}", 300);
    let files = collect_matching_files(&mock, Path::new(REPO), &patterns(&["test_results/*.json"])).unwrap();
    let selected = select_latest_file(&mock, Path::new(REPO), &files).unwrap();
    assert_eq!(selected.relative, "test_results/new.json");
}

#[test]
fn version_control_metadata_is_never_searched() {
    let mock = MockFileSystem::new();
    mock.add_file_with_mtime("/repo/.git/hooks/results.json", "{}", 999);
    mock.add_file_with_mtime("/repo/out/results.json", "{}", 1);

    let files = collect_matching_files(&mock, Path::new(REPO), &patterns(&["**/*.json"])).unwrap();

    assert_eq!(files, vec![Path::new("/repo/out/results.json").to_path_buf()]);
}

#[tokio::test]
async fn selected_file_is_announced_to_the_sink() {
    let f = fixture();
    f.mock
        .add_file_with_mtime("/repo/test_results/run-1/report.json", "{}", 10);
    f.mock
        .add_file_with_mtime("/repo/test_results/run-2/report.json", "{}", 20);
    let trigger = TriggerMessageBuilder::new("trigger-001")
        .priority(Priority::High)
        .build();

    let report = f.handler.handle(&trigger).await.unwrap();

    assert_eq!(report.detail, "selected test_results/run-2/report.json");
    assert_eq!(f.vcs.pulls(), 1);
    let received = f.sink.received();
    assert_eq!(received.len(), 1);
    let n = &received[0];
    assert_eq!(n.trigger_id, "trigger-001");
    assert_eq!(n.commit_hash, SAMPLE_HASH);
    assert_eq!(n.file, "test_results/run-2/report.json");
    assert_eq!(n.priority, Priority::High);
    assert_eq!(n.timestamp, trigger.timestamp);
}

#[tokio::test]
async fn no_matching_file_fails_the_trigger() {
    let f = fixture();
    f.mock.add_file_with_mtime("/repo/README.md", "hi", 10);
    let trigger = TriggerMessageBuilder::new("trigger-001").build();

    let err = f.handler.handle(&trigger).await.unwrap_err();

    assert_eq!(
        err,
        DispatchError::NoMatchingFiles(vec!["test_results/**/*.json".to_string()])
    );
    assert!(f.sink.received().is_empty());
}

#[tokio::test]
async fn failed_pull_is_an_external_failure() {
    let f = fixture();
    f.mock
        .add_file_with_mtime("/repo/test_results/report.json", "{}", 10);
    f.vcs.fail_pulls(1);
    let trigger = TriggerMessageBuilder::new("trigger-001").build();

    let err = f.handler.handle(&trigger).await.unwrap_err();
    assert!(matches!(err, DispatchError::External(ref msg) if msg.starts_with("pull failed")), "{err}");
    assert!(f.sink.received().is_empty());

    // Next trigger pulls again and succeeds.
    f.handler.handle(&trigger).await.unwrap();
    assert_eq!(f.vcs.pulls(), 2);
}

#[tokio::test]
async fn pull_can_be_disabled() {
    let f = fixture();
    f.mock
        .add_file_with_mtime("/repo/test_results/report.json", "{}", 10);
    f.vcs.fail_pulls(1);
    let handler = f.handler.clone().with_pull(false);

    handler
        .handle(&TriggerMessageBuilder::new("trigger-001").build())
        .await
        .unwrap();
    assert_eq!(f.vcs.pulls(), 0);
}

#[tokio::test]
async fn dispatcher_routes_only_registered_actions() {
    let f = fixture();
    f.mock
        .add_file_with_mtime("/repo/test_results/report.json", "{}", 10);
    let dispatcher = ActionDispatcher::new(Duration::from_secs(5))
        .with_handler(Action::AnalyzeTestResults, Arc::new(f.handler.clone()));

    let analyze = TriggerMessageBuilder::new("trigger-001").build();
    assert!(dispatcher.dispatch(&analyze).await.is_ok());

    for action in [Action::DeployFixes, Action::RunTests, Action::Custom] {
        let trigger = TriggerMessageBuilder::new("trigger-002").action(action).build();
        assert_eq!(
            dispatcher.dispatch(&trigger).await.unwrap_err(),
            DispatchError::NotImplemented(action)
        );
    }
    assert_eq!(f.sink.received().len(), 1);
}

#[tokio::test]
async fn timeout_fires_while_the_result_search_is_still_walking() {
    let mock = MockFileSystem::new();
    for dir in ["a", "b", "c", "d"] {
        mock.add_file_with_mtime(format!("/repo/{dir}/results.json"), "{}", 10);
    }
    let slow: Arc<dyn FileSystem> = Arc::new(SlowFileSystem::new(
        Arc::new(mock),
        Duration::from_millis(300),
    ));
    let sink = RecordingSink::new();
    let handler = AnalyzeTestResultsHandler::new(
        Arc::new(FakeVcs::new(SAMPLE_HASH, "msg")),
        slow,
        REPO,
        Arc::new(sink.clone()),
    );
    let dispatcher = ActionDispatcher::new(Duration::from_millis(100))
        .with_handler(Action::AnalyzeTestResults, Arc::new(handler));

    let trigger = TriggerMessageBuilder::new("trigger-001")
        .files(&["**/*.json"])
        .build();
    let started = Instant::now();
    let err = dispatcher.dispatch(&trigger).await.unwrap_err();

    assert!(matches!(err, DispatchError::TimedOut(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));

    // The abandoned walk finishes in the background without announcing.
    tokio::time::sleep(Duration::from_millis(1700)).await;
    assert!(sink.received().is_empty());
}

#[tokio::test]
async fn end_to_end_on_a_real_checkout() {
    let dir = TempDir::new().unwrap();
    common::write_file(dir.path(), "test_results/unit/report.json", "{}");
    common::write_file(dir.path(), ".git/results/ignored.json", "{}");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let sink_path = dir.path().join("notify/analysis.log");
    let handler = AnalyzeTestResultsHandler::new(
        Arc::new(FakeVcs::new(SAMPLE_HASH, "msg")),
        Arc::clone(&fs),
        dir.path(),
        Arc::new(LogFileSink::new(Arc::clone(&fs), &sink_path)),
    );

    let trigger = TriggerMessageBuilder::new("trigger-001")
        .files(&["**/*.json"])
        .build();
    let report = handler.handle(&trigger).await.unwrap();
    assert_eq!(report.detail, "selected test_results/unit/report.json");

    let log = std::fs::read_to_string(&sink_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let parsed: AnalysisReady = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed.file, "test_results/unit/report.json");
    assert!(lines[0].contains("\"triggerId\":\"trigger-001\""));
}

#[test]
fn queue_sink_writes_one_file_per_notification() {
    let mock = MockFileSystem::new();
    let sink = QueueDirSink::new(Arc::new(mock.clone()), "/notify");
    let trigger = TriggerMessageBuilder::new("trigger-001").build();
    let notification = AnalysisReady {
        trigger_id: trigger.id.clone(),
        commit_hash: trigger.commit_hash.clone(),
        commit_message: trigger.commit_message.clone(),
        file: "test_results/report.json".to_string(),
        timestamp: trigger.timestamp,
        timezone: trigger.timezone,
        priority: trigger.priority,
    };

    sink.emit(&notification).unwrap();

    let files = mock.files_in("/notify");
    assert_eq!(files, vec![Path::new("/notify/analysis-trigger-001.json").to_path_buf()]);
    let back: AnalysisReady =
        serde_json::from_str(&mock.read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(back, notification);
}
