// src/types.rs

use serde::Deserialize;

/// How producers hand artifacts to the consumer.
///
/// - `Queue`: every trigger gets its own uniquely named file (default).
/// - `Mailbox`: legacy single-slot mode. Every write goes to the same
///   well-known filename, so a second write before the consumer picks up the
///   first one silently replaces it. Lossy; only use it for producers that
///   cannot be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    Queue,
    Mailbox,
}

impl Default for ExchangeMode {
    fn default() -> Self {
        ExchangeMode::Queue
    }
}

/// What wakes the directory watcher up between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeStrategyKind {
    /// Sleep for the poll interval.
    Poll,
    /// Wake on OS change notifications, with the poll interval as an upper bound.
    Notify,
}

impl Default for WakeStrategyKind {
    fn default() -> Self {
        WakeStrategyKind::Poll
    }
}

/// Where "analysis ready" notifications go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One plain-text line per notification on stdout.
    Console,
    /// JSON lines appended to a log file.
    Log,
    /// One JSON file per notification in a directory.
    Queue,
}

impl Default for SinkKind {
    fn default() -> Self {
        SinkKind::Console
    }
}
