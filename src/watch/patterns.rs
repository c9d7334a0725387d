// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;

/// Directory names never descended into when walking a repository.
pub const SKIPPED_DIRS: &[&str] = &[".git"];

/// A compiled list of glob patterns.
///
/// Patterns are matched against `/`-separated paths relative to some root
/// (the repository root for `filesToCheck`, the trigger directory for the
/// artifact pattern).
#[derive(Clone)]
pub struct FilePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for FilePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePatterns")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl FilePatterns {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: patterns.to_vec(),
            set: build_globset(patterns)?,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// `path` relative to `root`, with `/` separators.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Collect all files under `root` whose relative path matches `patterns`,
/// skipping [`SKIPPED_DIRS`].
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &FilePatterns,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                let skipped = path
                    .file_name()
                    .map(|n| SKIPPED_DIRS.iter().any(|s| n == *s))
                    .unwrap_or(false);
                if !skipped {
                    stack.push(path);
                }
            } else if fs.is_file(&path) {
                if let Some(rel) = relative_slash_path(root, &path) {
                    if patterns.matches(&rel) {
                        files.push(path);
                    }
                }
            }
        }
    }

    Ok(files)
}
