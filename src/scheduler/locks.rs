//! Per-identity serialization.
//!
//! Two overlapping `start()` calls for one identity could each cancel
//! "the" prior job and each enqueue a new one. Every mutating controller
//! operation therefore holds the identity's async mutex for its whole
//! cancel/enqueue sequence.

use crate::scheduler::job::JobId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Map size above which idle slots are pruned on the next lock.
const PRUNE_THRESHOLD: usize = 1024;

/// Held while an identity is being mutated.
pub type IdentityGuard = OwnedMutexGuard<()>;

/// Lazily created async mutex per [`JobId`].
#[derive(Default)]
pub struct IdentityLocks {
    slots: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &JobId) -> IdentityGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            if slots.len() > PRUNE_THRESHOLD {
                // Only the map holds an idle slot.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of tracked identities.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
