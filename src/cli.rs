// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `triggerd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "triggerd",
    version,
    about = "File-based trigger exchange between a commit watcher and a directory watcher.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Triggerd.toml` in the current working directory. A missing
    /// file is not an error; documented defaults are used instead.
    #[arg(long, value_name = "PATH", default_value = "Triggerd.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRIGGERD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate and write a trigger artifact.
    Generate(GenerateArgs),

    /// Run the directory watcher (consumer daemon).
    Watch {
        /// Run a single poll pass and exit.
        #[arg(long)]
        once: bool,
    },

    /// Run the commit watcher (producer daemon).
    Commits {
        /// Run a single poll pass and exit.
        #[arg(long)]
        once: bool,
    },

    /// Parse + validate the config, print it and the templates, then exit.
    CheckConfig,
}

/// Parameters of the trigger generator.
#[derive(Debug, Clone, Default, Args)]
pub struct GenerateArgs {
    /// analyze_test_results, deploy_fixes, run_tests or custom.
    #[arg(long)]
    pub action: Option<String>,

    /// 7 to 40 hex characters.
    #[arg(long, value_name = "HASH")]
    pub commit_hash: String,

    #[arg(long, value_name = "MESSAGE", default_value = "")]
    pub commit_message: String,

    /// Glob patterns of files the consumer should look at. Repeatable.
    #[arg(long = "files", value_name = "GLOB", num_args = 1..)]
    pub files_to_check: Vec<String>,

    /// high, normal or low.
    #[arg(long)]
    pub priority: Option<String>,

    /// test_computer, dev_computer or automated.
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub custom_data: Option<String>,

    /// Named template supplying default action, priority and files.
    #[arg(long, value_name = "NAME")]
    pub template: Option<String>,

    /// Only validate; do not write anything.
    #[arg(long)]
    pub validate_only: bool,

    /// Print the full trigger JSON.
    #[arg(long)]
    pub verbose: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
