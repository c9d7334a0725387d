// src/watch/mod.rs

//! The consumer side: a polling directory watcher that claims trigger
//! artifacts, dispatches them and archives the outcome.

pub mod patterns;
pub mod poller;
pub mod seen;
pub mod wake;

pub use patterns::{build_globset, collect_matching_files, FilePatterns};
pub use poller::{DirectoryWatcher, PollReport, RecoveryReport, WATCHER_COMPONENT};
pub use seen::{ArtifactIdentity, SeenSet};
pub use wake::{build_wake, IntervalWake, NotifyWake, WakeStrategy};
