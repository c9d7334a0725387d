// src/trigger/model.rs

//! Typed trigger message as persisted in the exchange directory.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed set of string values, declared as a lookup table.
///
/// The table is the single place that defines which strings are accepted for
/// a field; parsing, `Display` and error messages all read from it.
pub trait SchemaEnum: Sized + Copy + PartialEq + 'static {
    const VARIANTS: &'static [(&'static str, Self)];

    fn parse(s: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, v)| *v)
    }

    fn as_str(self) -> &'static str {
        Self::VARIANTS
            .iter()
            .find(|(_, v)| *v == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    /// `"a", "b", "c"` listing used in validation messages.
    fn expected() -> String {
        let names: Vec<String> = Self::VARIANTS
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .collect();
        names.join(", ")
    }
}

macro_rules! schema_enum_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as SchemaEnum>::parse(s).ok_or_else(|| {
                    format!(
                        "invalid value \"{s}\" (expected one of {})",
                        <$ty as SchemaEnum>::expected()
                    )
                })
            }
        }
    };
}

/// What the consumer is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AnalyzeTestResults,
    DeployFixes,
    RunTests,
    Custom,
}

impl SchemaEnum for Action {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("analyze_test_results", Action::AnalyzeTestResults),
        ("deploy_fixes", Action::DeployFixes),
        ("run_tests", Action::RunTests),
        ("custom", Action::Custom),
    ];
}
schema_enum_impls!(Action);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl SchemaEnum for Priority {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("high", Priority::High),
        ("normal", Priority::Normal),
        ("low", Priority::Low),
    ];
}
schema_enum_impls!(Priority);

/// Which machine produced the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    TestComputer,
    DevComputer,
    Automated,
}

impl SchemaEnum for Source {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("test_computer", Source::TestComputer),
        ("dev_computer", Source::DevComputer),
        ("automated", Source::Automated),
    ];
}
schema_enum_impls!(Source);

/// Timezone tag carried next to the (UTC) timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Timezone {
    Et,
    Ct,
    Mt,
    Pt,
    Utc,
}

impl SchemaEnum for Timezone {
    const VARIANTS: &'static [(&'static str, Self)] = &[
        ("ET", Timezone::Et),
        ("CT", Timezone::Ct),
        ("MT", Timezone::Mt),
        ("PT", Timezone::Pt),
        ("UTC", Timezone::Utc),
    ];
}
schema_enum_impls!(Timezone);

impl Default for Timezone {
    fn default() -> Self {
        Timezone::Utc
    }
}

/// Provenance attached by the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub generator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
}

/// One unit of work.
///
/// Immutable once persisted: the exchange only ever replaces (mailbox mode)
/// or moves whole artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessage {
    /// Derived from the artifact filename, never stored inside it.
    #[serde(skip)]
    pub id: String,
    pub action: Action,
    pub commit_hash: String,
    pub commit_message: String,
    pub timestamp: DateTime<Utc>,
    pub timezone: Timezone,
    pub files_to_check: Vec<String>,
    pub priority: Priority,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl TriggerMessage {
    /// Serialize to the on-disk JSON representation.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Abbreviated commit hash for log lines.
    pub fn short_hash(&self) -> &str {
        let end = self.commit_hash.len().min(7);
        &self.commit_hash[..end]
    }
}
