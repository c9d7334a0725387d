// src/exec/process.rs

//! Process-table collaborator: find processes by name and terminate them.

use anyhow::Result;
use tracing::{debug, warn};

use super::command::run_program;
use super::BoxFuture;

pub trait ProcessTable: Send + Sync {
    fn find_processes_by_name(&self, name: &str) -> BoxFuture<'_, Result<Vec<u32>>>;

    /// Returns `true` if the process is gone afterwards.
    fn terminate(&self, pid: u32, force: bool) -> BoxFuture<'_, bool>;
}

/// Uses `pgrep`/`kill` on Unix and `tasklist`/`taskkill` on Windows.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn find_processes_by_name(&self, name: &str) -> BoxFuture<'_, Result<Vec<u32>>> {
        let name = name.to_string();
        Box::pin(async move {
            if cfg!(windows) {
                let filter = format!("IMAGENAME eq {name}");
                let out =
                    run_program("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"], None, None)
                        .await?;
                Ok(parse_tasklist_csv(&out.stdout))
            } else {
                let out = run_program("pgrep", &["-x", &name], None, None).await?;
                // pgrep exits 1 when nothing matched.
                Ok(parse_pid_lines(&out.stdout))
            }
        })
    }

    fn terminate(&self, pid: u32, force: bool) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let pid_str = pid.to_string();
            let result = if cfg!(windows) {
                let mut args = vec!["/PID", pid_str.as_str()];
                if force {
                    args.push("/F");
                }
                run_program("taskkill", &args, None, None).await
            } else {
                let signal = if force { "-KILL" } else { "-TERM" };
                run_program("kill", &[signal, &pid_str], None, None).await
            };

            match result {
                Ok(out) if out.success() => {
                    debug!(pid, force, "process terminated");
                    true
                }
                Ok(out) => {
                    warn!(pid, force, output = %out.combined(), "terminate failed");
                    false
                }
                Err(err) => {
                    warn!(pid, force, error = %err, "terminate could not run");
                    false
                }
            }
        })
    }
}

/// One pid per line (`pgrep` output).
pub fn parse_pid_lines(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .collect()
}

/// `"image","pid",...` rows (`tasklist /FO CSV /NH` output).
pub fn parse_tasklist_csv(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|l| l.split(',').nth(1))
        .filter_map(|pid| pid.trim().trim_matches('"').parse::<u32>().ok())
        .collect()
}
