// src/watch/wake.rs

//! When the next poll pass starts.
//!
//! The directory listing always decides what gets processed; a wake strategy
//! only shortens the wait between passes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exec::BoxFuture;
use crate::types::WakeStrategyKind;

pub trait WakeStrategy: Send {
    /// Wait until the next pass should start.
    fn wait(&mut self) -> BoxFuture<'_, ()>;
}

/// Fixed interval sleep.
#[derive(Debug, Clone)]
pub struct IntervalWake {
    interval: Duration,
}

impl IntervalWake {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl WakeStrategy for IntervalWake {
    fn wait(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(self.interval))
    }
}

/// Wakes on OS change notifications for the trigger directory, with the poll
/// interval as an upper bound.
pub struct NotifyWake {
    // Dropping the watcher stops notifications.
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<Event>,
    interval: Duration,
}

impl std::fmt::Debug for NotifyWake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWake")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl NotifyWake {
    pub fn new(dir: &Path, interval: Duration) -> Result<Self> {
        // Channel from the blocking notify callback into the async world.
        let (event_tx, events) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    // The receiver is gone only after the wake strategy was dropped.
                    let _ = event_tx.send(event);
                }
                Err(err) => warn!(error = %err, "file watch error"),
            },
            Config::default(),
        )
        .context("creating file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {:?}", dir))?;

        info!("change notifications enabled on {:?}", dir);

        Ok(Self {
            _watcher: watcher,
            events,
            interval,
        })
    }
}

impl WakeStrategy for NotifyWake {
    fn wait(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match tokio::time::timeout(self.interval, self.events.recv()).await {
                Ok(Some(event)) => {
                    debug!(?event, "woken by change notification");
                    // Coalesce the burst that usually follows a write + rename.
                    while self.events.try_recv().is_ok() {}
                }
                Ok(None) => {
                    warn!("change notifications stopped; falling back to interval");
                    tokio::time::sleep(self.interval).await;
                }
                Err(_) => {}
            }
        })
    }
}

/// Wake strategy selected by `watcher.strategy`. A notify watcher that cannot
/// be created degrades to interval polling.
pub fn build_wake(kind: WakeStrategyKind, dir: &Path, interval: Duration) -> Box<dyn WakeStrategy> {
    match kind {
        WakeStrategyKind::Poll => Box::new(IntervalWake::new(interval)),
        WakeStrategyKind::Notify => match NotifyWake::new(dir, interval) {
            Ok(wake) => Box::new(wake),
            Err(err) => {
                warn!(error = %err, "change notifications unavailable; polling instead");
                Box::new(IntervalWake::new(interval))
            }
        },
    }
}
