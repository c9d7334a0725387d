// tests/directory_watcher.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockExchange;
use triggerd::archive::{ArchiveOutcome, ArchiveRecord, RecordResult};
use triggerd::cli::Command;
use triggerd::dispatch::ActionDispatcher;
use triggerd::errors::TriggerdError;
use triggerd::shutdown::Shutdown;
use triggerd::trigger::{parse_trigger, Action};
use triggerd::types::ExchangeMode;
use triggerd::watch::{DirectoryWatcher, IntervalWake};
use triggerd::exit_code;
use triggerd_test_utils::builders::{TriggerMessageBuilder, TriggerRequestBuilder};
use triggerd_test_utils::fakes::CountingHandler;
use triggerd_test_utils::{init_tracing, with_timeout};

fn dispatcher(handler: &CountingHandler, timeout: Duration) -> ActionDispatcher {
    ActionDispatcher::new(timeout).with_handler(Action::AnalyzeTestResults, Arc::new(handler.clone()))
}

fn started_watcher(ex: &MockExchange, handler: &CountingHandler) -> DirectoryWatcher {
    let mut watcher = DirectoryWatcher::new(
        Arc::clone(&ex.fs),
        ex.exchange.clone(),
        dispatcher(handler, Duration::from_secs(5)),
    )
    .unwrap();
    watcher.start().unwrap();
    watcher
}

fn valid_artifact(id: &str) -> String {
    TriggerMessageBuilder::new(id).json()
}

#[tokio::test]
async fn failed_claim_is_retried_and_handled_exactly_once() {
    init_tracing();
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    ex.put_artifact("trigger-001.json", &valid_artifact("trigger-001"));

    ex.mock.fail_renames_into(ex.exchange.processing_dir());
    let report = watcher.poll_once().await;
    assert_eq!(report.discovered, 1);
    assert_eq!(handler.total_calls(), 0);
    assert_eq!(ex.pending_files(), vec!["trigger-001.json"]);

    ex.mock.clear_failures();
    let report = watcher.poll_once().await;
    assert_eq!(report.archived, 1);
    assert_eq!(handler.calls_for("trigger-001"), 1);

    for _ in 0..3 {
        let report = watcher.poll_once().await;
        assert_eq!(report.discovered, 0);
    }
    assert_eq!(handler.calls_for("trigger-001"), 1);
    assert_eq!(
        ex.archived_files(),
        vec!["trigger-001.json", "trigger-001.record.json"]
    );
    assert!(ex.processing_files().is_empty());
}

#[tokio::test]
async fn every_artifact_present_is_handled_in_one_pass() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    for n in 1..=5 {
        let id = format!("trigger-00{n}");
        ex.put_artifact(&format!("{id}.json"), &valid_artifact(&id));
    }

    let report = watcher.poll_once().await;

    assert_eq!(report.discovered, 5);
    assert_eq!(report.archived, 5);
    assert_eq!(handler.total_calls(), 5);
    assert!(ex.pending_files().is_empty());
}

#[tokio::test]
async fn malformed_artifact_does_not_block_the_next_one() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    ex.put_artifact("trigger-001.json", "{ this is not json");
    ex.put_artifact("trigger-002.json", &valid_artifact("trigger-002"));

    let report = watcher.poll_once().await;

    assert_eq!(report.error_archived, 1);
    assert_eq!(report.archived, 1);
    assert_eq!(handler.calls_for("trigger-002"), 1);
    assert_eq!(
        ex.error_archived_files(),
        vec!["trigger-001.json", "trigger-001.record.json"]
    );

    let record = watcher.archive().find_record("trigger-001").unwrap().unwrap();
    assert_eq!(record.outcome, ArchiveOutcome::ErrorArchived);
    assert!(matches!(record.result, RecordResult::Malformed { .. }));
    assert_eq!(record.raw.as_deref(), Some("{ this is not json"));

    let metrics = watcher.metrics();
    assert_eq!(metrics.total_triggers, 2);
    assert_eq!(metrics.successful, 1);
    assert_eq!(metrics.failed, 1);
    assert!(metrics.last_health_check.is_some());
}

#[tokio::test]
async fn schema_violation_is_error_archived_with_its_fields() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    let contents = valid_artifact("trigger-001").replace("\"normal\"", "\"urgent\"");
    ex.put_artifact("trigger-001.json", &contents);

    let report = watcher.poll_once().await;
    assert_eq!(report.error_archived, 1);
    assert_eq!(handler.total_calls(), 0);

    let record_text = ex.read(
        &watcher
            .archive()
            .record_path(ArchiveOutcome::ErrorArchived, "trigger-001"),
    );
    assert!(record_text.contains("commitHash"));

    let record = watcher.archive().find_record("trigger-001").unwrap().unwrap();
    match record.result {
        RecordResult::ValidationFailed { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "priority");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn action_without_handler_is_error_archived() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    let contents = TriggerMessageBuilder::new("trigger-001")
        .action(Action::DeployFixes)
        .json();
    ex.put_artifact("trigger-001.json", &contents);

    let report = watcher.poll_once().await;
    assert_eq!(report.error_archived, 1);

    let record = watcher.archive().find_record("trigger-001").unwrap().unwrap();
    let trigger = record.trigger.expect("validated trigger is kept");
    assert_eq!(trigger.id, "trigger-001");
    assert_eq!(trigger.action, Action::DeployFixes);
    match record.result {
        RecordResult::HandlerFailed { error } => assert!(error.contains("deploy_fixes"), "{error}"),
        other => panic!("expected handler failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_handler_times_out_and_is_error_archived() {
    let ex = MockExchange::new();
    let handler = CountingHandler::slow(Duration::from_secs(5));
    let mut watcher = DirectoryWatcher::new(
        Arc::clone(&ex.fs),
        ex.exchange.clone(),
        dispatcher(&handler, Duration::from_millis(50)),
    )
    .unwrap();
    watcher.start().unwrap();
    ex.put_artifact("trigger-001.json", &valid_artifact("trigger-001"));

    let report = with_timeout(watcher.poll_once()).await;

    assert_eq!(report.error_archived, 1);
    let record = watcher.archive().find_record("trigger-001").unwrap().unwrap();
    match record.result {
        RecordResult::HandlerFailed { error } => assert!(error.contains("timed out"), "{error}"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_archive_move_is_retried_without_rewriting_the_record() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    ex.put_artifact("trigger-001.json", &valid_artifact("trigger-001"));

    ex.mock.fail_renames_into(ex.exchange.archive_dir());
    let report = watcher.poll_once().await;
    assert_eq!(report.archived, 1);
    assert_eq!(report.pending_archives, 1);
    assert_eq!(ex.processing_files(), vec!["trigger-001.json"]);
    assert_eq!(ex.archived_files(), vec!["trigger-001.record.json"]);

    let record_path = watcher
        .archive()
        .record_path(ArchiveOutcome::Archived, "trigger-001");
    let first_record = ex.read(&record_path);

    // Still failing: stays pending, handler not rerun.
    let report = watcher.poll_once().await;
    assert_eq!(report.retried_archives, 0);
    assert_eq!(report.pending_archives, 1);

    ex.mock.clear_failures();
    let report = watcher.poll_once().await;
    assert_eq!(report.retried_archives, 1);
    assert_eq!(report.pending_archives, 0);
    assert_eq!(watcher.pending_archives(), 0);

    assert_eq!(ex.read(&record_path), first_record);
    assert!(ex.processing_files().is_empty());
    assert_eq!(
        ex.archived_files(),
        vec!["trigger-001.json", "trigger-001.record.json"]
    );
    assert_eq!(handler.calls_for("trigger-001"), 1);
}

#[tokio::test]
async fn unreadable_claimed_artifact_stays_in_processing_until_readable() {
    init_tracing();
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    ex.put_artifact("trigger-001.json", &valid_artifact("trigger-001"));

    ex.mock.fail_reads_in(ex.exchange.processing_dir());
    let report = watcher.poll_once().await;
    assert_eq!(report.discovered, 1);
    assert_eq!(report.archived, 0);
    assert_eq!(report.error_archived, 0);
    assert_eq!(report.deferred_reads, 1);
    assert_eq!(handler.total_calls(), 0);
    assert_eq!(ex.processing_files(), vec!["trigger-001.json"]);
    assert!(ex.archived_files().is_empty());
    assert!(ex.error_archived_files().is_empty());

    // Still unreadable: kept for the next pass, nothing rediscovered.
    let report = watcher.poll_once().await;
    assert_eq!(report.discovered, 0);
    assert_eq!(report.deferred_reads, 1);

    ex.mock.clear_failures();
    let report = watcher.poll_once().await;
    assert_eq!(report.archived, 1);
    assert_eq!(report.deferred_reads, 0);
    assert_eq!(handler.calls_for("trigger-001"), 1);
    assert!(ex.processing_files().is_empty());
    assert!(ex.error_archived_files().is_empty());
    assert_eq!(
        ex.archived_files(),
        vec!["trigger-001.json", "trigger-001.record.json"]
    );
}

#[tokio::test]
async fn start_fails_with_io_error_when_processing_dir_cannot_be_created() {
    let ex = MockExchange::new();
    ex.mock.add_file(ex.exchange.processing_dir(), "not a directory");
    let handler = CountingHandler::new();
    let mut watcher = DirectoryWatcher::new(
        Arc::clone(&ex.fs),
        ex.exchange.clone(),
        dispatcher(&handler, Duration::from_secs(5)),
    )
    .unwrap();

    let err = watcher.start().unwrap_err();
    assert!(matches!(err, TriggerdError::IoError(_)), "got {err:?}");
    assert_eq!(exit_code(&Command::Watch { once: false }, &err), 3);
}

#[tokio::test]
async fn mailbox_keeps_only_the_latest_unconsumed_trigger() {
    let ex = MockExchange::with_mode(ExchangeMode::Mailbox);
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    let writer = ex.writer();

    writer
        .write(&TriggerRequestBuilder::new().commit_hash("1111111").build())
        .unwrap();
    writer
        .write(&TriggerRequestBuilder::new().commit_hash("2222222").build())
        .unwrap();
    let report = watcher.poll_once().await;
    assert_eq!(report.archived, 1);

    writer
        .write(&TriggerRequestBuilder::new().commit_hash("3333333").build())
        .unwrap();
    let report = watcher.poll_once().await;
    assert_eq!(report.archived, 1);
    assert!(ex.pending_files().is_empty());

    let records = watcher.archive().list(ArchiveOutcome::Archived).unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id, "each claim gets its own id");
    let hashes: Vec<String> = records
        .iter()
        .map(|r| r.trigger.as_ref().unwrap().commit_hash.clone())
        .collect();
    assert_eq!(hashes, vec!["2222222", "3333333"]);
    assert_eq!(handler.total_calls(), 2);
}

#[tokio::test]
async fn startup_recovers_in_flight_artifacts() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();

    // Crashed before archiving: no record.
    ex.mock.add_file(
        ex.exchange.processing_dir().join("trigger-005.json"),
        valid_artifact("trigger-005"),
    );
    // Crashed between record and move.
    let finished = TriggerMessageBuilder::new("trigger-006").build();
    let record = ArchiveRecord::for_trigger(
        &finished,
        RecordResult::Handled {
            detail: "done".to_string(),
        },
    );
    ex.mock.add_file(
        ex.exchange.processing_dir().join("trigger-006.json"),
        finished.to_json().unwrap(),
    );
    ex.mock.add_file(
        ex.exchange.archive_dir().join("trigger-006.record.json"),
        serde_json::to_string_pretty(&record).unwrap(),
    );

    let mut watcher = DirectoryWatcher::new(
        Arc::clone(&ex.fs),
        ex.exchange.clone(),
        dispatcher(&handler, Duration::from_secs(5)),
    )
    .unwrap();
    let recovery = watcher.start().unwrap();

    assert_eq!(recovery.completed, 1);
    assert_eq!(recovery.requeued, 1);
    assert_eq!(ex.pending_files(), vec!["trigger-005.json"]);
    assert!(ex.processing_files().is_empty());

    watcher.poll_once().await;
    assert_eq!(handler.calls_for("trigger-005"), 1);
    assert_eq!(handler.calls_for("trigger-006"), 0);
    assert_eq!(
        ex.archived_files(),
        vec![
            "trigger-005.json",
            "trigger-005.record.json",
            "trigger-006.json",
            "trigger-006.record.json",
        ]
    );
}

#[tokio::test]
async fn recovery_can_be_disabled() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    ex.mock.add_file(
        ex.exchange.processing_dir().join("trigger-005.json"),
        valid_artifact("trigger-005"),
    );

    let mut watcher = DirectoryWatcher::new(
        Arc::clone(&ex.fs),
        ex.exchange.clone(),
        dispatcher(&handler, Duration::from_secs(5)),
    )
    .unwrap()
    .with_recovery(false);
    let recovery = watcher.start().unwrap();

    assert_eq!(recovery.completed + recovery.requeued, 0);
    assert_eq!(ex.processing_files(), vec!["trigger-005.json"]);
}

#[tokio::test]
async fn staging_files_and_unrelated_names_are_ignored() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    ex.put_artifact(".trigger-001.json.tmp", &valid_artifact("x"));
    ex.put_artifact("notes.txt", "hello");
    ex.put_artifact("result-001.json", &valid_artifact("x"));

    let report = watcher.poll_once().await;

    assert_eq!(report.discovered, 0);
    assert_eq!(handler.total_calls(), 0);
    assert_eq!(ex.pending_files().len(), 3);
}

#[tokio::test]
async fn run_loop_processes_until_shutdown() {
    let ex = MockExchange::new();
    let handler = CountingHandler::new();
    let mut watcher = started_watcher(&ex, &handler);
    let written = ex
        .writer()
        .write(&TriggerRequestBuilder::new().build())
        .unwrap();
    let metrics = watcher.subscribe();

    let shutdown = Shutdown::new();
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.trigger();
    });

    with_timeout(watcher.run(Box::new(IntervalWake::new(Duration::from_millis(20))), &shutdown)).await;

    assert_eq!(handler.calls_for(&written.message.id), 1);
    assert_eq!(metrics.borrow().successful, 1);

    let archived = watcher
        .archive()
        .artifact_path(ArchiveOutcome::Archived, &written.message.id);
    let parsed = parse_trigger(&written.message.id, &ex.read(&archived)).unwrap();
    assert_eq!(parsed, written.message);
}
