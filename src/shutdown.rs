// src/shutdown.rs

//! Cooperative shutdown signal shared by the daemon loops and the telemetry
//! task.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any handle, so this cannot fail early.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Trigger shutdown on Ctrl-C.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    this.trigger();
                }
                Err(err) => warn!(error = %err, "could not listen for Ctrl-C"),
            }
        })
    }
}
