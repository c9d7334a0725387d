// src/watch/seen.rs

use std::collections::HashSet;
use std::time::SystemTime;

/// Identity of an artifact as observed by the watcher: file name plus
/// modification time. A rewritten mailbox file gets a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactIdentity {
    pub file_name: String,
    pub modified: SystemTime,
}

/// Identities already handled (or being handled) by this watcher.
///
/// Only identities still present in the trigger directory are kept, so the
/// set never grows past the directory listing.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<ArtifactIdentity>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ArtifactIdentity) -> bool {
        self.seen.contains(id)
    }

    /// Returns `true` if the identity was not seen before.
    pub fn insert(&mut self, id: ArtifactIdentity) -> bool {
        self.seen.insert(id)
    }

    pub fn forget(&mut self, id: &ArtifactIdentity) {
        self.seen.remove(id);
    }

    /// Drop identities that are no longer in `present`.
    pub fn retain_present(&mut self, present: &[ArtifactIdentity]) {
        let present: HashSet<&ArtifactIdentity> = present.iter().collect();
        self.seen.retain(|id| present.contains(id));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
