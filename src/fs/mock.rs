// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    /// Logical clock; every write moves it forward by one second.
    clock: u64,
    /// Renames whose destination lives in one of these dirs fail.
    failing_rename_dirs: BTreeSet<PathBuf>,
    /// Reads of files directly inside these dirs fail.
    failing_read_dirs: BTreeSet<PathBuf>,
}

/// In-memory filesystem with a logical clock for modification times.
///
/// Directories are explicit entries; writing a file creates its ancestors.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.clock += 1;
        let modified = UNIX_EPOCH + Duration::from_secs(state.clock);
        insert_file(&mut state, path.as_ref(), content.into(), modified);
    }

    /// Add a file with an explicit modification time (seconds since epoch).
    pub fn add_file_with_mtime(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        mtime_secs: u64,
    ) {
        let mut state = self.lock();
        let modified = UNIX_EPOCH + Duration::from_secs(mtime_secs);
        insert_file(&mut state, path.as_ref(), content.into(), modified);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.lock();
        ensure_dirs(&mut state, path.as_ref());
    }

    /// Make every rename into `dir` fail with `PermissionDenied`.
    pub fn fail_renames_into(&self, dir: impl AsRef<Path>) {
        self.lock()
            .failing_rename_dirs
            .insert(dir.as_ref().to_path_buf());
    }

    /// Make every read of a file directly inside `dir` fail.
    pub fn fail_reads_in(&self, dir: impl AsRef<Path>) {
        self.lock()
            .failing_read_dirs
            .insert(dir.as_ref().to_path_buf());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_rename_dirs.clear();
        state.failing_read_dirs.clear();
    }

    /// Files (not directories) directly inside `dir`, sorted.
    pub fn files_in(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.lock()
            .entries
            .iter()
            .filter(|(p, e)| p.parent() == Some(dir) && matches!(e, MockEntry::File { .. }))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

fn insert_file(state: &mut MockState, path: &Path, content: Vec<u8>, modified: SystemTime) {
    if let Some(parent) = path.parent() {
        ensure_dirs(state, parent);
    }
    state
        .entries
        .insert(path.to_path_buf(), MockEntry::File { content, modified });
}

fn ensure_dirs(state: &mut MockState, path: &Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        state
            .entries
            .entry(ancestor.to_path_buf())
            .or_insert(MockEntry::Dir);
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        if let Some(dir) = path.parent().filter(|d| state.failing_read_dirs.contains(*d)) {
            return Err(anyhow!("injected read failure in {:?}", dir));
        }
        match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.clock += 1;
        let modified = UNIX_EPOCH + Duration::from_secs(state.clock);
        let mut content = match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => content.clone(),
            Some(MockEntry::Dir) => return Err(anyhow!("Is a directory: {:?}", path)),
            None => Vec::new(),
        };
        content.extend_from_slice(contents);
        insert_file(&mut state, path, content, modified);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.lock();

        let dest_dir = to.parent().unwrap_or(Path::new(""));
        if state.failing_rename_dirs.iter().any(|d| d == dest_dir) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected rename failure into {:?}", dest_dir),
            ));
        }
        if !matches!(state.entries.get(dest_dir), Some(MockEntry::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("destination dir missing: {:?}", dest_dir),
            ));
        }

        match state.entries.remove(from) {
            Some(entry @ MockEntry::File { .. }) => {
                state.entries.insert(to.to_path_buf(), entry);
                Ok(())
            }
            Some(MockEntry::Dir) => {
                state.entries.insert(from.to_path_buf(), MockEntry::Dir);
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "renaming directories is not supported by the mock",
                ))
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("File not found: {:?}", from),
            )),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::File { .. }) => {
                state.entries.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if let Some(MockEntry::File { .. }) = state.entries.get(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        ensure_dirs(&mut state, path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::Dir))
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        match self.lock().entries.get(path) {
            Some(MockEntry::File { modified, .. }) => Ok(*modified),
            Some(MockEntry::Dir) => Ok(UNIX_EPOCH),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::Dir) => Ok(state
                .entries
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
