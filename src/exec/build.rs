// src/exec/build.rs

//! Build/test invocation collaborator.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{Result, TriggerdError};

use super::command::{run_shell, CommandOutput};
use super::BoxFuture;

pub trait BuildInvoker: Send + Sync {
    /// Run `command` to completion.
    ///
    /// A non-zero exit is a normal [`CommandOutput`]; only a failure to run
    /// the command at all, or exceeding `timeout`, is an error
    /// (`TriggerdError::ExternalProcess`).
    fn run(&self, command: &str, timeout: Duration) -> BoxFuture<'_, Result<CommandOutput>>;
}

/// Runs build commands through the platform shell in a fixed directory.
#[derive(Debug, Clone)]
pub struct ShellBuildInvoker {
    cwd: PathBuf,
}

impl ShellBuildInvoker {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl BuildInvoker for ShellBuildInvoker {
    fn run(&self, command: &str, timeout: Duration) -> BoxFuture<'_, Result<CommandOutput>> {
        let command = command.to_string();
        Box::pin(async move {
            run_shell(&command, Some(&self.cwd), Some(timeout))
                .await
                .map_err(|e| TriggerdError::ExternalProcess(format!("{e:#}")))
        })
    }
}
