// src/exec/command.rs

//! Running external commands with captured output and an optional deadline.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Exit code and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed; handy for log lines.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// Run `program args...` and capture its output.
pub async fn run_program(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    run_captured(cmd, &format!("{program} {}", args.join(" ")), cwd, timeout).await
}

/// Run a shell command line and capture its output.
pub async fn run_shell(
    line: &str,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    run_captured(shell_command(line), line, cwd, timeout).await
}

async fn run_captured(
    mut cmd: Command,
    cmd_display: &str,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    // The child is killed if the deadline drops the wait future.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(cmd = %cmd_display, cwd = ?cwd, "spawning process");

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning process '{cmd_display}'"))?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("process '{cmd_display}' timed out after {limit:?}"))?,
        None => child.wait_with_output().await,
    }
    .with_context(|| format!("waiting for process '{cmd_display}'"))?;

    let exit_code = output.status.code().unwrap_or(-1);
    info!(cmd = %cmd_display, exit_code, "process exited");

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
