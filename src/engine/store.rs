//! Published diagnostics, keyed by local file path
//!
//! A path is present only while it has at least one diagnostic.

use super::diagnostic::DiagnosticRecord;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Process-wide diagnostic store
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    entries: DashMap<PathBuf, Vec<DiagnosticRecord>>,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Replace the diagnostics of a path; an empty list removes the entry
    pub fn set(&self, path: PathBuf, records: Vec<DiagnosticRecord>) {
        if records.is_empty() {
            self.entries.remove(&path);
        } else {
            self.entries.insert(path, records);
        }
    }

    /// Remove a path, returning whether it was present
    pub fn remove(&self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Remove every entry, returning the paths that were present
    pub fn clear(&self) -> Vec<PathBuf> {
        let paths = self.paths();
        self.entries.clear();
        paths
    }

    pub fn get(&self, path: &Path) -> Option<Vec<DiagnosticRecord>> {
        self.entries.get(path).map(|records| records.clone())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of paths with diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All paths with diagnostics, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.entries.iter().map(|r| r.key().clone()).collect();
        paths.sort();
        paths
    }
}
