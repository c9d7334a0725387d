// tests/schema_validation.rs

use serde_json::json;

use triggerd::trigger::{parse_trigger, Action, ParseFailure, Timezone};

fn valid() -> serde_json::Value {
    json!({
        "action": "analyze_test_results",
        "commitHash": "0123abcd",
        "commitMessage": "Add integration results",
        "timestamp": "2026-03-14T15:09:26Z",
        "timezone": "ET",
        "filesToCheck": ["test_results/**/*.json"],
        "priority": "normal",
        "source": "test_computer"
    })
}

fn invalid_fields(value: serde_json::Value) -> Vec<String> {
    match parse_trigger("t", &value.to_string()) {
        Err(ParseFailure::Invalid(errors)) => errors.fields().into_iter().map(String::from).collect(),
        other => panic!("expected schema violation, got {other:?}"),
    }
}

#[test]
fn valid_artifact_parses() {
    let msg = parse_trigger("trigger-1", &valid().to_string()).unwrap();
    assert_eq!(msg.id, "trigger-1");
    assert_eq!(msg.action, Action::AnalyzeTestResults);
    assert_eq!(msg.timezone, Timezone::Et);
    assert!(msg.metadata.is_none());
    assert!(msg.custom_data.is_none());
}

#[test]
fn missing_members_are_reported_as_missing() {
    let mut value = valid();
    let obj = value.as_object_mut().unwrap();
    obj.remove("commitHash");
    obj.remove("source");

    match parse_trigger("t", &value.to_string()) {
        Err(ParseFailure::Invalid(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|e| e.reason == "missing"));
            assert!(errors.has_field("commitHash"));
            assert!(errors.has_field("source"));
        }
        other => panic!("expected schema violation, got {other:?}"),
    }
}

#[test]
fn enum_values_are_case_sensitive() {
    let mut value = valid();
    value["priority"] = json!("HIGH");
    value["timezone"] = json!("est");
    let fields = invalid_fields(value);
    assert!(fields.contains(&"priority".to_string()));
    assert!(fields.contains(&"timezone".to_string()));
}

#[test]
fn bad_timestamp_and_glob_are_field_errors() {
    let mut value = valid();
    value["timestamp"] = json!("yesterday");
    value["filesToCheck"] = json!(["results/[unclosed"]);
    let fields = invalid_fields(value);
    assert_eq!(fields, vec!["timestamp", "filesToCheck"]);
}

#[test]
fn commit_hash_accepts_both_cases_within_bounds() {
    let forty = "f".repeat(40);
    let forty_one = "f".repeat(41);
    for hash in ["abcdef0", "ABCDEF0123", forty.as_str()] {
        let mut value = valid();
        value["commitHash"] = json!(hash);
        assert!(parse_trigger("t", &value.to_string()).is_ok(), "{hash}");
    }
    for hash in ["abcdef", forty_one.as_str(), "abcdefg"] {
        let mut value = valid();
        value["commitHash"] = json!(hash);
        assert_eq!(invalid_fields(value), vec!["commitHash"], "{hash}");
    }
}

#[test]
fn non_json_and_wrong_types_are_malformed() {
    assert!(matches!(
        parse_trigger("t", "{ not json"),
        Err(ParseFailure::Malformed(_))
    ));
    assert!(matches!(
        parse_trigger("t", "[1, 2, 3]"),
        Err(ParseFailure::Malformed(_))
    ));

    let mut value = valid();
    value["filesToCheck"] = json!("test_results/*.json");
    assert!(matches!(
        parse_trigger("t", &value.to_string()),
        Err(ParseFailure::Malformed(_))
    ));
}
