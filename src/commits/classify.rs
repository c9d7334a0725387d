// src/commits/classify.rs

//! Commit message → (action, priority).

use std::sync::LazyLock;

use regex::Regex;

use crate::trigger::{Action, Priority};

/// One row of the ordered rule table.
#[derive(Debug)]
pub struct ClassificationRule {
    pub action: Action,
    pub pattern: Regex,
}

fn rule(action: Action, pattern: &str) -> ClassificationRule {
    ClassificationRule {
        action,
        pattern: Regex::new(pattern).expect("classification pattern is valid"),
    }
}

/// Evaluated top to bottom; the first match wins.
static RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    vec![
        rule(Action::RunTests, r"(?i)\b(run|execute|add)\b.*test|unit test"),
        rule(Action::AnalyzeTestResults, r"(?i)test|result|analysis"),
        rule(Action::DeployFixes, r"(?i)fix|deploy|update"),
    ]
});

static HIGH_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)critical|urgent|emergency|hotfix|important|priority")
        .expect("priority pattern is valid")
});

pub const DEFAULT_ACTION: Action = Action::AnalyzeTestResults;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub action: Action,
    pub priority: Priority,
}

pub fn rules() -> &'static [ClassificationRule] {
    &RULES
}

/// Action from the first matching rule, priority from keywords.
/// The two are independent.
pub fn classify(message: &str) -> Classification {
    let action = RULES
        .iter()
        .find(|r| r.pattern.is_match(message))
        .map(|r| r.action)
        .unwrap_or(DEFAULT_ACTION);

    let priority = if HIGH_PRIORITY.is_match(message) {
        Priority::High
    } else {
        Priority::Normal
    };

    Classification { action, priority }
}
