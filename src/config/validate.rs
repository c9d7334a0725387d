// src/config/validate.rs

use std::time::Duration;

use globset::Glob;

use crate::config::model::*;
use crate::errors::{Result, TriggerdError};
use crate::trigger::{Action, Priority, SchemaEnum, Source, TemplateRegistry, Timezone, TriggerTemplate};
use crate::types::SinkKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TriggerdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        Ok(ConfigFile {
            exchange: validate_exchange(raw.exchange)?,
            watcher: validate_watcher(raw.watcher)?,
            commits: validate_commits(raw.commits)?,
            notify: validate_notify(raw.notify)?,
            telemetry: validate_telemetry(raw.telemetry)?,
            templates: validate_templates(raw.template)?,
        })
    }
}

fn config_error(msg: impl Into<String>) -> TriggerdError {
    TriggerdError::ConfigError(msg.into())
}

fn validate_exchange(raw: RawExchangeSection) -> Result<ExchangeConfig> {
    let defaults = ExchangeConfig::default();

    let pattern = raw.pattern.unwrap_or(defaults.pattern);
    Glob::new(&pattern)
        .map_err(|e| config_error(format!("[exchange].pattern \"{pattern}\" is not a valid glob: {e}")))?;

    let mailbox_file = raw.mailbox_file.unwrap_or(defaults.mailbox_file);
    if mailbox_file.trim().is_empty() || mailbox_file.contains(['/', '\\']) {
        return Err(config_error(format!(
            "[exchange].mailbox_file must be a plain file name (got \"{mailbox_file}\")"
        )));
    }

    let timezone = match raw.timezone {
        Some(tz) => tz
            .parse::<Timezone>()
            .map_err(|e| config_error(format!("[exchange].timezone: {e}")))?,
        None => defaults.timezone,
    };

    Ok(ExchangeConfig {
        trigger_dir: raw.trigger_dir.unwrap_or(defaults.trigger_dir),
        pattern,
        mode: raw.mode,
        mailbox_file,
        timezone,
    })
}

fn validate_watcher(raw: RawWatcherSection) -> Result<WatcherConfig> {
    let defaults = WatcherConfig::default();
    Ok(WatcherConfig {
        poll_interval: duration_field("[watcher].poll_interval", raw.poll_interval, defaults.poll_interval)?,
        strategy: raw.strategy,
        handler_timeout: duration_field(
            "[watcher].handler_timeout",
            raw.handler_timeout,
            defaults.handler_timeout,
        )?,
        recover_in_flight: raw.recover_in_flight.unwrap_or(defaults.recover_in_flight),
        repo_path: raw.repo_path.unwrap_or(defaults.repo_path),
        pull_before_analysis: raw
            .pull_before_analysis
            .unwrap_or(defaults.pull_before_analysis),
    })
}

fn validate_commits(raw: RawCommitsSection) -> Result<CommitsConfig> {
    let defaults = CommitsConfig::default();

    for pat in raw.files_to_check.iter() {
        Glob::new(pat).map_err(|e| {
            config_error(format!("[commits].files_to_check \"{pat}\" is not a valid glob: {e}"))
        })?;
    }

    let source = match raw.source {
        Some(s) => s
            .parse::<Source>()
            .map_err(|e| config_error(format!("[commits].source: {e}")))?,
        None => defaults.source,
    };

    let build = match raw.build {
        Some(b) => {
            if b.command.trim().is_empty() {
                return Err(config_error("[commits.build].command must not be empty"));
            }
            Some(BuildConfig {
                command: b.command,
                stop_processes: b.stop_processes,
                force_stop: b.force_stop,
                timeout: duration_field("[commits.build].timeout", b.timeout, DEFAULT_BUILD_TIMEOUT)?,
            })
        }
        None => None,
    };

    // An empty marker would match every commit message.
    let skip_marker = match raw.skip_marker {
        Some(m) if m.trim().is_empty() => None,
        Some(m) => Some(m),
        None => defaults.skip_marker,
    };

    Ok(CommitsConfig {
        poll_interval: duration_field("[commits].poll_interval", raw.poll_interval, defaults.poll_interval)?,
        repo_path: raw.repo_path.unwrap_or(defaults.repo_path),
        files_to_check: raw.files_to_check,
        template: raw.template.or(defaults.template),
        source,
        trigger_on_start: raw.trigger_on_start,
        skip_marker,
        backoff_max: duration_field("[commits].backoff_max", raw.backoff_max, defaults.backoff_max)?,
        build,
    })
}

fn validate_notify(raw: RawNotifySection) -> Result<NotifyConfig> {
    match (raw.sink, raw.path.as_ref()) {
        (SinkKind::Log, None) | (SinkKind::Queue, None) => Err(config_error(format!(
            "[notify].path is required when sink = \"{}\"",
            match raw.sink {
                SinkKind::Log => "log",
                _ => "queue",
            }
        ))),
        _ => Ok(NotifyConfig {
            sink: raw.sink,
            path: raw.path,
        }),
    }
}

fn validate_telemetry(raw: RawTelemetrySection) -> Result<TelemetryConfig> {
    let defaults = TelemetryConfig::default();
    let retention_days = raw.retention_days.unwrap_or(defaults.retention_days);
    if retention_days == 0 {
        return Err(config_error("[telemetry].retention_days must be >= 1 (got 0)"));
    }
    Ok(TelemetryConfig {
        enabled: raw.enabled.unwrap_or(defaults.enabled),
        dir: raw.dir.unwrap_or(defaults.dir),
        performance_interval: duration_field(
            "[telemetry].performance_interval",
            raw.performance_interval,
            defaults.performance_interval,
        )?,
        health_interval: duration_field(
            "[telemetry].health_interval",
            raw.health_interval,
            defaults.health_interval,
        )?,
        retention_days,
    })
}

/// Built-in templates, then `[template.<name>]` sections on top.
fn validate_templates(
    raw: std::collections::BTreeMap<String, RawTemplate>,
) -> Result<TemplateRegistry> {
    let mut registry = TemplateRegistry::builtin();

    for (name, t) in raw {
        let action = t
            .action
            .map(|a| parse_enum::<Action>(&name, "action", &a))
            .transpose()?;
        let priority = t
            .priority
            .map(|p| parse_enum::<Priority>(&name, "priority", &p))
            .transpose()?;
        for pat in t.files_to_check.iter() {
            Glob::new(pat).map_err(|e| {
                config_error(format!(
                    "[template.{name}].files_to_check \"{pat}\" is not a valid glob: {e}"
                ))
            })?;
        }

        registry.insert(TriggerTemplate {
            name: name.clone(),
            description: t.description,
            action,
            priority,
            files_to_check: t.files_to_check,
        });
    }

    Ok(registry)
}

fn parse_enum<E: SchemaEnum>(template: &str, field: &str, value: &str) -> Result<E> {
    E::parse(value).ok_or_else(|| {
        config_error(format!(
            "[template.{template}].{field}: \"{value}\" is not one of {}",
            E::expected()
        ))
    })
}

fn duration_field(name: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(s) = value else {
        return Ok(default);
    };
    let d = parse_duration(&s).map_err(|e| config_error(format!("{name}: {e}")))?;
    if d.is_zero() {
        return Err(config_error(format!("{name} must be greater than zero")));
    }
    Ok(d)
}

/// Parse strings like `"500ms"`, `"2s"`, `"5m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
