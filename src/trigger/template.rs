// src/trigger/template.rs

//! Named trigger templates.
//!
//! A template supplies defaults for `action`, `priority` and `filesToCheck`;
//! anything given explicitly to the writer wins over the template.

use std::collections::BTreeMap;

use crate::trigger::model::{Action, Priority};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTemplate {
    pub name: String,
    pub description: String,
    pub action: Option<Action>,
    pub priority: Option<Priority>,
    pub files_to_check: Vec<String>,
}

impl TriggerTemplate {
    fn builtin(
        name: &str,
        description: &str,
        action: Action,
        priority: Priority,
        files: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            action: Some(action),
            priority: Some(priority),
            files_to_check: files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Templates shipped with the binary.
pub fn builtin_templates() -> Vec<TriggerTemplate> {
    vec![
        TriggerTemplate::builtin(
            "test_results",
            "Analyze the newest test result file",
            Action::AnalyzeTestResults,
            Priority::Normal,
            &["test_results/**/*.json", "test_results/**/*.xml"],
        ),
        TriggerTemplate::builtin(
            "quick_test",
            "Run the fast test suite",
            Action::RunTests,
            Priority::Normal,
            &["test_results/**/*.json"],
        ),
        TriggerTemplate::builtin(
            "deploy",
            "Deploy fixes from the latest commit",
            Action::DeployFixes,
            Priority::High,
            &["**/*.rs", "**/*.toml"],
        ),
        TriggerTemplate::builtin(
            "urgent_analysis",
            "Analyze results ahead of everything else",
            Action::AnalyzeTestResults,
            Priority::High,
            &["test_results/**/*"],
        ),
    ]
}

/// Lookup table of templates by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TriggerTemplate>,
}

impl TemplateRegistry {
    /// Registry containing only the built-in templates.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for t in builtin_templates() {
            registry.insert(t);
        }
        registry
    }

    /// Add or replace a template.
    pub fn insert(&mut self, template: TriggerTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&TriggerTemplate> {
        self.templates.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(|k| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TriggerTemplate> {
        self.templates.values()
    }
}
