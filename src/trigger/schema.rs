// src/trigger/schema.rs

//! Validation of trigger artifacts.
//!
//! Incoming JSON is first deserialized into [`RawTrigger`], where every field
//! is optional and enum fields are plain strings. [`RawTrigger::into_message`]
//! then runs each field through one rule of the [`Checker`], collecting every
//! violation instead of stopping at the first one. The writer builds a
//! `RawTrigger` too, so producer and consumer share exactly one validator.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use globset::Glob;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::trigger::model::{
    Action, Metadata, Priority, SchemaEnum, Source, Timezone, TriggerMessage,
};

pub const SCHEMA_VERSION: &str = "1.0";
pub const MAX_COMMIT_MESSAGE_CHARS: usize = 500;
pub const MAX_CUSTOM_DATA_CHARS: usize = 1000;

static COMMIT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{7,40}$").expect("commit hash regex is valid"));

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// JSON field name, e.g. `commitHash`.
    pub field: String,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every rule a trigger violated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: &str, reason: impl Into<String>) -> Self {
        ValidationErrors(vec![FieldError {
            field: field.to_string(),
            reason: reason.into(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn push(&mut self, field: &str, reason: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            reason: reason.into(),
        });
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Untyped view of a trigger artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrigger {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub files_to_check: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub custom_data: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl RawTrigger {
    /// Validate every field and build the typed message.
    pub fn into_message(self, id: impl Into<String>) -> Result<TriggerMessage, ValidationErrors> {
        let mut check = Checker::default();

        let action = check.enumeration::<Action>("action", self.action);
        let commit_hash = check.pattern(
            "commitHash",
            self.commit_hash,
            &COMMIT_HASH_RE,
            "must be 7-40 hexadecimal characters",
        );
        let commit_message =
            check.max_chars("commitMessage", self.commit_message, MAX_COMMIT_MESSAGE_CHARS);
        let timestamp = check.timestamp("timestamp", self.timestamp);
        let timezone = check.enumeration::<Timezone>("timezone", self.timezone);
        let files_to_check = check.globs("filesToCheck", self.files_to_check);
        let priority = check.enumeration::<Priority>("priority", self.priority);
        let source = check.enumeration::<Source>("source", self.source);
        let custom_data =
            check.optional_max_chars("customData", self.custom_data, MAX_CUSTOM_DATA_CHARS);

        match (
            action,
            commit_hash,
            commit_message,
            timestamp,
            timezone,
            files_to_check,
            priority,
            source,
            custom_data,
        ) {
            (
                Some(action),
                Some(commit_hash),
                Some(commit_message),
                Some(timestamp),
                Some(timezone),
                Some(files_to_check),
                Some(priority),
                Some(source),
                Some(custom_data),
            ) if check.errors.is_empty() => Ok(TriggerMessage {
                id: id.into(),
                action,
                commit_hash,
                commit_message,
                timestamp,
                timezone,
                files_to_check,
                priority,
                source,
                custom_data,
                metadata: self.metadata,
            }),
            _ => Err(check.errors),
        }
    }
}

impl From<&TriggerMessage> for RawTrigger {
    fn from(m: &TriggerMessage) -> Self {
        RawTrigger {
            action: Some(m.action.to_string()),
            commit_hash: Some(m.commit_hash.clone()),
            commit_message: Some(m.commit_message.clone()),
            timestamp: Some(m.timestamp.to_rfc3339()),
            timezone: Some(m.timezone.to_string()),
            files_to_check: Some(m.files_to_check.clone()),
            priority: Some(m.priority.to_string()),
            source: Some(m.source.to_string()),
            custom_data: m.custom_data.clone(),
            metadata: m.metadata.clone(),
        }
    }
}

/// Why an artifact could not be turned into a [`TriggerMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not JSON, or JSON of the wrong shape.
    Malformed(String),
    /// Well-formed JSON that violates field rules.
    Invalid(ValidationErrors),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::Malformed(e) => write!(f, "malformed JSON: {e}"),
            ParseFailure::Invalid(errors) => write!(f, "schema violation: {errors}"),
        }
    }
}

/// Parse and validate artifact contents.
pub fn parse_trigger(id: &str, contents: &str) -> Result<TriggerMessage, ParseFailure> {
    let raw: RawTrigger =
        serde_json::from_str(contents).map_err(|e| ParseFailure::Malformed(e.to_string()))?;
    raw.into_message(id).map_err(ParseFailure::Invalid)
}

/// Collects field errors; every rule returns `None` exactly when it recorded
/// an error.
#[derive(Debug, Default)]
struct Checker {
    errors: ValidationErrors,
}

impl Checker {
    fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.errors.push(field, "missing");
        }
        value
    }

    fn enumeration<E: SchemaEnum>(&mut self, field: &str, value: Option<String>) -> Option<E> {
        let value = self.required(field, value)?;
        let parsed = E::parse(&value);
        if parsed.is_none() {
            self.errors.push(
                field,
                format!("\"{value}\" is not one of {}", E::expected()),
            );
        }
        parsed
    }

    fn pattern(
        &mut self,
        field: &str,
        value: Option<String>,
        re: &Regex,
        describe: &str,
    ) -> Option<String> {
        let value = self.required(field, value)?;
        if re.is_match(&value) {
            Some(value)
        } else {
            self.errors.push(field, format!("\"{value}\" {describe}"));
            None
        }
    }

    fn max_chars(&mut self, field: &str, value: Option<String>, max: usize) -> Option<String> {
        let value = self.required(field, value)?;
        self.within_chars(field, value, max)
    }

    fn optional_max_chars(
        &mut self,
        field: &str,
        value: Option<String>,
        max: usize,
    ) -> Option<Option<String>> {
        match value {
            None => Some(None),
            Some(v) => self.within_chars(field, v, max).map(Some),
        }
    }

    fn within_chars(&mut self, field: &str, value: String, max: usize) -> Option<String> {
        let count = value.chars().count();
        if count > max {
            self.errors
                .push(field, format!("{count} characters exceeds the limit of {max}"));
            None
        } else {
            Some(value)
        }
    }

    fn timestamp(&mut self, field: &str, value: Option<String>) -> Option<DateTime<Utc>> {
        let value = self.required(field, value)?;
        match DateTime::parse_from_rfc3339(&value) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                self.errors
                    .push(field, format!("\"{value}\" is not an RFC 3339 timestamp: {e}"));
                None
            }
        }
    }

    fn globs(&mut self, field: &str, value: Option<Vec<String>>) -> Option<Vec<String>> {
        let patterns = self.required(field, value)?;
        if patterns.is_empty() {
            self.errors.push(field, "must contain at least one pattern");
            return None;
        }

        let before = self.errors.len();
        for (idx, pat) in patterns.iter().enumerate() {
            if pat.trim().is_empty() {
                self.errors.push(field, format!("entry {idx} is empty"));
            } else if let Err(e) = Glob::new(pat) {
                self.errors
                    .push(field, format!("entry {idx} \"{pat}\" is not a valid glob: {e}"));
            }
        }

        if self.errors.len() == before {
            Some(patterns)
        } else {
            None
        }
    }
}
