// src/commits/mod.rs

//! The producer daemon: watches a repository and writes a trigger for every
//! new commit.

pub mod backoff;
pub mod classify;
pub mod watcher;

pub use backoff::Backoff;
pub use classify::{classify, Classification, ClassificationRule, DEFAULT_ACTION};
pub use watcher::{CommitPoll, CommitStats, CommitWatcher, COMMITS_COMPONENT};
