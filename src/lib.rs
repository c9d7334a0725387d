// src/lib.rs

pub mod archive;
pub mod cli;
pub mod commits;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod shutdown;
pub mod telemetry;
pub mod trigger;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, GenerateArgs};
use crate::commits::CommitWatcher;
use crate::config::loader::load_or_default;
use crate::config::model::{ConfigFile, TelemetryConfig};
use crate::dispatch::{build_sink, ActionDispatcher, AnalyzeTestResultsHandler};
use crate::errors::{Result, TriggerdError};
use crate::exec::{GitCli, ShellBuildInvoker, SystemProcessTable};
use crate::fs::{FileSystem, RealFileSystem};
use crate::shutdown::Shutdown;
use crate::telemetry::{HostProbe, PerformanceMetrics, TelemetryRecorder};
use crate::trigger::{Action, TriggerRequest, TriggerWriter};
use crate::watch::{build_wake, DirectoryWatcher};

/// Process exit code for a failed command.
///
/// - `2`: the trigger did not validate.
/// - `3`: a daemon (or the config) could not start.
/// - `1`: anything else, e.g. the trigger could not be written.
pub fn exit_code(command: &Command, err: &TriggerdError) -> i32 {
    match (command, err) {
        (_, TriggerdError::Validation(_)) => 2,
        (_, TriggerdError::ConfigError(_)) => 3,
        (Command::Watch { .. } | Command::Commits { .. } | Command::CheckConfig, _) => 3,
        (Command::Generate(_), _) => 1,
    }
}

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;

    match args.command {
        Command::Generate(generate_args) => generate(cfg, &generate_args),
        Command::Watch { once } => run_watch(cfg, once).await,
        Command::Commits { once } => run_commits(cfg, once).await,
        Command::CheckConfig => {
            print_config(&cfg);
            Ok(())
        }
    }
}

impl From<&GenerateArgs> for TriggerRequest {
    fn from(args: &GenerateArgs) -> Self {
        TriggerRequest {
            action: args.action.clone(),
            commit_hash: args.commit_hash.clone(),
            commit_message: args.commit_message.clone(),
            files_to_check: args.files_to_check.clone(),
            priority: args.priority.clone(),
            source: args.source.clone(),
            custom_data: args.custom_data.clone(),
            template: args.template.clone(),
        }
    }
}

fn generate(cfg: ConfigFile, args: &GenerateArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let writer = TriggerWriter::new(fs, cfg.exchange, cfg.templates);
    let request = TriggerRequest::from(args);

    if args.validate_only {
        let message = writer.prepare(&request)?;
        println!("trigger is valid ({} / {})", message.action, message.priority);
        if args.verbose {
            println!("{}", message.to_json()?);
        }
        return Ok(());
    }

    let written = writer.write(&request)?;
    println!("{}", written.path.display());
    if args.verbose {
        println!("{}", written.message.to_json()?);
    }
    Ok(())
}

fn spawn_telemetry(
    cfg: &TelemetryConfig,
    fs: Arc<dyn FileSystem>,
    disk_path: PathBuf,
    metrics: tokio::sync::watch::Receiver<PerformanceMetrics>,
    shutdown: &Shutdown,
) -> Option<JoinHandle<()>> {
    if !cfg.enabled {
        debug!("telemetry disabled");
        return None;
    }
    let probe = Arc::new(HostProbe::new(disk_path));
    Some(TelemetryRecorder::new(cfg, fs, probe, metrics).spawn(shutdown.clone()))
}

async fn run_watch(cfg: ConfigFile, once: bool) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let sink = build_sink(&cfg.notify, Arc::clone(&fs))
        .map_err(|e| TriggerdError::ConfigError(format!("{e:#}")))?;
    let vcs = Arc::new(GitCli::new(&cfg.watcher.repo_path));
    let analyze = AnalyzeTestResultsHandler::new(vcs, Arc::clone(&fs), &cfg.watcher.repo_path, sink)
        .with_pull(cfg.watcher.pull_before_analysis);
    let dispatcher = ActionDispatcher::new(cfg.watcher.handler_timeout)
        .with_handler(Action::AnalyzeTestResults, Arc::new(analyze));

    let mut watcher = DirectoryWatcher::new(Arc::clone(&fs), cfg.exchange.clone(), dispatcher)?
        .with_recovery(cfg.watcher.recover_in_flight);
    watcher.start()?;

    if once {
        let report = watcher.poll_once().await;
        info!(?report, "single pass finished");
        return Ok(());
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let telemetry = spawn_telemetry(
        &cfg.telemetry,
        Arc::clone(&fs),
        cfg.exchange.trigger_dir.clone(),
        watcher.subscribe(),
        &shutdown,
    );
    let wake = build_wake(
        cfg.watcher.strategy,
        &cfg.exchange.trigger_dir,
        cfg.watcher.poll_interval,
    );

    watcher.run(wake, &shutdown).await;
    if let Some(handle) = telemetry {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_commits(cfg: ConfigFile, once: bool) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    fs.create_dir_all(&cfg.exchange.trigger_dir)
        .map_err(errors::io_failure)?;

    let writer = TriggerWriter::new(Arc::clone(&fs), cfg.exchange.clone(), cfg.templates.clone());
    let vcs = Arc::new(GitCli::new(&cfg.commits.repo_path));
    let builder = Arc::new(ShellBuildInvoker::new(&cfg.commits.repo_path));
    let mut watcher = CommitWatcher::new(
        cfg.commits.clone(),
        vcs,
        writer,
        Arc::new(SystemProcessTable),
        builder,
    );

    if once {
        let outcome = watcher.poll_once().await;
        info!(?outcome, "single pass finished");
        return Ok(());
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let telemetry = spawn_telemetry(
        &cfg.telemetry,
        Arc::clone(&fs),
        cfg.exchange.trigger_dir.clone(),
        watcher.subscribe(),
        &shutdown,
    );

    watcher.run(&shutdown).await;
    if let Some(handle) = telemetry {
        let _ = handle.await;
    }
    Ok(())
}

/// Print the effective configuration and templates.
fn print_config(cfg: &ConfigFile) {
    println!("triggerd effective configuration");
    println!();

    let ex = &cfg.exchange;
    println!("exchange:");
    println!("  trigger_dir = {}", ex.trigger_dir.display());
    println!("  pattern = {}", ex.pattern);
    println!("  mode = {:?}", ex.mode);
    println!("  mailbox_file = {}", ex.mailbox_file);
    println!("  timezone = {}", ex.timezone);
    println!();

    let w = &cfg.watcher;
    println!("watcher:");
    println!("  poll_interval = {:?}", w.poll_interval);
    println!("  strategy = {:?}", w.strategy);
    println!("  handler_timeout = {:?}", w.handler_timeout);
    println!("  recover_in_flight = {}", w.recover_in_flight);
    println!("  repo_path = {}", w.repo_path.display());
    println!("  pull_before_analysis = {}", w.pull_before_analysis);
    println!();

    let c = &cfg.commits;
    println!("commits:");
    println!("  poll_interval = {:?}", c.poll_interval);
    println!("  repo_path = {}", c.repo_path.display());
    if !c.files_to_check.is_empty() {
        println!("  files_to_check = {:?}", c.files_to_check);
    }
    if let Some(ref t) = c.template {
        println!("  template = {t}");
    }
    println!("  source = {}", c.source);
    println!("  trigger_on_start = {}", c.trigger_on_start);
    if let Some(ref m) = c.skip_marker {
        println!("  skip_marker = {m}");
    }
    println!("  backoff_max = {:?}", c.backoff_max);
    if let Some(ref b) = c.build {
        println!("  build.command = {}", b.command);
        println!("  build.timeout = {:?}", b.timeout);
        if !b.stop_processes.is_empty() {
            println!("  build.stop_processes = {:?} (force: {})", b.stop_processes, b.force_stop);
        }
    }
    println!();

    println!("notify:");
    println!("  sink = {:?}", cfg.notify.sink);
    if let Some(ref p) = cfg.notify.path {
        println!("  path = {}", p.display());
    }
    println!();

    let t = &cfg.telemetry;
    println!("telemetry:");
    println!("  enabled = {}", t.enabled);
    println!("  dir = {}", t.dir.display());
    println!("  performance_interval = {:?}", t.performance_interval);
    println!("  health_interval = {:?}", t.health_interval);
    println!("  retention_days = {}", t.retention_days);
    println!();

    println!("templates ({}):", cfg.templates.names().len());
    for template in cfg.templates.iter() {
        println!("  - {}", template.name);
        if !template.description.is_empty() {
            println!("      {}", template.description);
        }
        if let Some(action) = template.action {
            println!("      action: {action}");
        }
        if let Some(priority) = template.priority {
            println!("      priority: {priority}");
        }
        if !template.files_to_check.is_empty() {
            println!("      files_to_check: {:?}", template.files_to_check);
        }
    }

    debug!("config check complete");
}
