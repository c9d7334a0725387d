#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use triggerd::config::model::ExchangeConfig;
use triggerd::fs::mock::MockFileSystem;
use triggerd::fs::FileSystem;
use triggerd::trigger::{TemplateRegistry, TriggerWriter};
use triggerd::types::ExchangeMode;

pub const TRIGGER_DIR: &str = "/exchange/triggers";

/// Mock filesystem plus an exchange rooted at [`TRIGGER_DIR`].
pub struct MockExchange {
    pub mock: MockFileSystem,
    pub fs: Arc<dyn FileSystem>,
    pub exchange: ExchangeConfig,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::with_mode(ExchangeMode::Queue)
    }

    pub fn with_mode(mode: ExchangeMode) -> Self {
        let mock = MockFileSystem::new();
        let fs: Arc<dyn FileSystem> = Arc::new(mock.clone());
        let mut exchange = ExchangeConfig::at(TRIGGER_DIR);
        exchange.mode = mode;
        Self { mock, fs, exchange }
    }

    pub fn writer(&self) -> TriggerWriter {
        TriggerWriter::new(
            Arc::clone(&self.fs),
            self.exchange.clone(),
            TemplateRegistry::builtin(),
        )
    }

    /// Drop raw contents straight into the trigger directory.
    pub fn put_artifact(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.exchange.trigger_dir.join(name);
        self.mock.add_file(&path, contents);
        path
    }

    pub fn read(&self, path: &Path) -> String {
        self.fs.read_to_string(path).unwrap()
    }

    pub fn archived_files(&self) -> Vec<String> {
        names(&self.mock.files_in(self.exchange.archive_dir()))
    }

    pub fn error_archived_files(&self) -> Vec<String> {
        names(&self.mock.files_in(self.exchange.error_archive_dir()))
    }

    pub fn pending_files(&self) -> Vec<String> {
        names(&self.mock.files_in(self.exchange.trigger_dir.clone()))
    }

    pub fn processing_files(&self) -> Vec<String> {
        names(&self.mock.files_in(self.exchange.processing_dir()))
    }
}

pub fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}
