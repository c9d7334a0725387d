// src/exec/mod.rs

//! External collaborators.
//!
//! Everything here shells out through `tokio::process::Command`:
//!
//! - [`command`] spawns a process with captured output and a deadline.
//! - [`vcs`] is the repository client (`pull`, `HEAD`, last message).
//! - [`process`] queries and terminates processes by name.
//! - [`build`] runs the optional build/test step of the commit watcher.
//!
//! Each collaborator is a trait so the daemons can be driven by fakes in
//! tests.

use std::future::Future;
use std::pin::Pin;

pub mod build;
pub mod command;
pub mod process;
pub mod vcs;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use build::{BuildInvoker, ShellBuildInvoker};
pub use command::{run_program, run_shell, CommandOutput};
pub use process::{ProcessTable, SystemProcessTable};
pub use vcs::{GitCli, PullOutcome, VcsClient};
