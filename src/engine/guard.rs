//! Single-flight guard for analysis runs
//!
//! At most one whole-project run and at most one run per file are in flight.
//! Later triggers for the same key wait their turn.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// What a run covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunKey {
    Project,
    File(PathBuf),
}

/// Per-key run serialization
#[derive(Debug, Default)]
pub struct RunGuard {
    slots: DashMap<RunKey, Arc<Mutex<()>>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `key`
    pub async fn acquire(&self, key: RunKey) -> OwnedMutexGuard<()> {
        // Clone the slot out so the map shard is not locked while waiting
        let slot = self.slots.entry(key).or_default().clone();
        slot.lock_owned().await
    }

    /// Whether a run for `key` is in flight
    pub fn is_busy(&self, key: &RunKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }
}
