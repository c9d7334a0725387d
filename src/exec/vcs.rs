// src/exec/vcs.rs

//! Version-control collaborator.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

use super::command::run_program;
use super::BoxFuture;

/// Result of a pull. Failures are data, not errors: callers decide whether
/// to back off, retry or fail a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub ok: bool,
    pub output: String,
}

/// Operations the daemons need from the repository.
pub trait VcsClient: Send + Sync {
    fn pull(&self) -> BoxFuture<'_, PullOutcome>;
    fn head_commit(&self) -> BoxFuture<'_, Result<String>>;
    fn last_commit_message(&self) -> BoxFuture<'_, Result<String>>;
}

/// `git` command-line client operating on one working copy.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let out = run_program("git", args, Some(&self.repo), Some(self.timeout)).await?;
        if !out.success() {
            bail!(
                "git {} exited with {}: {}",
                args.join(" "),
                out.exit_code,
                out.combined()
            );
        }
        Ok(out.stdout.trim().to_string())
    }
}

impl VcsClient for GitCli {
    fn pull(&self) -> BoxFuture<'_, PullOutcome> {
        Box::pin(async move {
            match run_program("git", &["pull", "--ff-only"], Some(&self.repo), Some(self.timeout)).await {
                Ok(out) => PullOutcome {
                    ok: out.success(),
                    output: out.combined(),
                },
                Err(err) => {
                    warn!(repo = ?self.repo, error = %err, "git pull could not run");
                    PullOutcome {
                        ok: false,
                        output: format!("{err:#}"),
                    }
                }
            }
        })
    }

    fn head_commit(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.git(&["rev-parse", "HEAD"]))
    }

    fn last_commit_message(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.git(&["log", "-1", "--pretty=%B"]))
    }
}
