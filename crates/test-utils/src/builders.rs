#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use triggerd::trigger::{Action, Priority, Source, Timezone, TriggerMessage, TriggerRequest};

pub const SAMPLE_HASH: &str = "a1b2c3d4e5f6";

/// Builder for a valid `TriggerRequest`; override only what a test cares about.
pub struct TriggerRequestBuilder {
    request: TriggerRequest,
}

impl TriggerRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: TriggerRequest {
                action: Some("analyze_test_results".to_string()),
                commit_hash: SAMPLE_HASH.to_string(),
                commit_message: "Update test results".to_string(),
                files_to_check: vec!["test_results/**/*.json".to_string()],
                priority: None,
                source: None,
                custom_data: None,
                template: None,
            },
        }
    }

    pub fn action(mut self, action: &str) -> Self {
        self.request.action = Some(action.to_string());
        self
    }

    pub fn no_action(mut self) -> Self {
        self.request.action = None;
        self
    }

    pub fn commit_hash(mut self, hash: &str) -> Self {
        self.request.commit_hash = hash.to_string();
        self
    }

    pub fn commit_message(mut self, message: &str) -> Self {
        self.request.commit_message = message.to_string();
        self
    }

    pub fn files(mut self, files: &[&str]) -> Self {
        self.request.files_to_check = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn priority(mut self, priority: &str) -> Self {
        self.request.priority = Some(priority.to_string());
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.request.source = Some(source.to_string());
        self
    }

    pub fn custom_data(mut self, data: &str) -> Self {
        self.request.custom_data = Some(data.to_string());
        self
    }

    pub fn template(mut self, name: &str) -> Self {
        self.request.template = Some(name.to_string());
        self
    }

    pub fn build(self) -> TriggerRequest {
        self.request
    }
}

impl Default for TriggerRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for an already-typed `TriggerMessage` (no metadata).
pub struct TriggerMessageBuilder {
    message: TriggerMessage,
}

impl TriggerMessageBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            message: TriggerMessage {
                id: id.to_string(),
                action: Action::AnalyzeTestResults,
                commit_hash: SAMPLE_HASH.to_string(),
                commit_message: "Update test results".to_string(),
                timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap(),
                timezone: Timezone::Utc,
                files_to_check: vec!["test_results/**/*.json".to_string()],
                priority: Priority::Normal,
                source: Source::Automated,
                custom_data: None,
                metadata: None,
            },
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.message.action = action;
        self
    }

    pub fn files(mut self, files: &[&str]) -> Self {
        self.message.files_to_check = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.message.priority = priority;
        self
    }

    pub fn commit_hash(mut self, hash: &str) -> Self {
        self.message.commit_hash = hash.to_string();
        self
    }

    pub fn build(self) -> TriggerMessage {
        self.message
    }

    /// Serialized artifact contents.
    pub fn json(self) -> String {
        self.message.to_json().expect("trigger serializes")
    }
}
