// src/dispatch/mod.rs

//! Routing of a validated trigger to the handler for its action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::model::DEFAULT_HANDLER_TIMEOUT;
use crate::exec::BoxFuture;
use crate::trigger::{Action, SchemaEnum, TriggerMessage};

pub mod analyze;
pub mod sink;

pub use analyze::{select_latest_file, AnalyzeTestResultsHandler, SelectedFile};
pub use sink::{
    build_sink, AnalysisReady, ConsoleSink, LogFileSink, NotificationSink, QueueDirSink,
};

/// What a successful handler reports back; stored in the archive record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub detail: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no handler implemented for action {0}")]
    NotImplemented(Action),

    #[error("external process failed: {0}")]
    External(String),

    #[error("no files matched {0:?}")]
    NoMatchingFiles(Vec<String>),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("handler failed: {0}")]
    Failed(String),
}

pub trait ActionHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        trigger: &'a TriggerMessage,
    ) -> BoxFuture<'a, Result<HandlerReport, DispatchError>>;
}

/// Fails every trigger with [`DispatchError::NotImplemented`].
#[derive(Debug, Clone, Default)]
pub struct NotImplementedHandler;

impl ActionHandler for NotImplementedHandler {
    fn handle<'a>(
        &'a self,
        trigger: &'a TriggerMessage,
    ) -> BoxFuture<'a, Result<HandlerReport, DispatchError>> {
        let action = trigger.action;
        Box::pin(async move { Err(DispatchError::NotImplemented(action)) })
    }
}

/// Maps every [`Action`] to a handler. Actions nobody registered stay on
/// [`NotImplementedHandler`].
#[derive(Clone)]
pub struct ActionDispatcher {
    handlers: HashMap<Action, Arc<dyn ActionHandler>>,
    timeout: Duration,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<&str> = self.handlers.keys().map(|a| a.as_str()).collect();
        actions.sort_unstable();
        f.debug_struct("ActionDispatcher")
            .field("actions", &actions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLER_TIMEOUT)
    }
}

impl ActionDispatcher {
    pub fn new(timeout: Duration) -> Self {
        let fallback: Arc<dyn ActionHandler> = Arc::new(NotImplementedHandler);
        let handlers = Action::VARIANTS
            .iter()
            .map(|(_, action)| (*action, Arc::clone(&fallback)))
            .collect();
        Self { handlers, timeout }
    }

    pub fn with_handler(mut self, action: Action, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the handler for `trigger.action`, bounded by the handler timeout.
    pub async fn dispatch(&self, trigger: &TriggerMessage) -> Result<HandlerReport, DispatchError> {
        let handler = self
            .handlers
            .get(&trigger.action)
            .ok_or(DispatchError::NotImplemented(trigger.action))?;

        debug!(trigger = %trigger.id, action = %trigger.action, "dispatching");
        let report = tokio::time::timeout(self.timeout, handler.handle(trigger))
            .await
            .map_err(|_| DispatchError::TimedOut(self.timeout))??;

        info!(trigger = %trigger.id, action = %trigger.action, detail = %report.detail, "handler succeeded");
        Ok(report)
    }
}
