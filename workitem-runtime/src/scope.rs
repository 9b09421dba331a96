//! Pending correlation-key changes of the running instance.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use workitem_core::{BookmarkScopeManager, InstanceKey};

#[derive(Default)]
struct PendingKeys {
    associate: BTreeSet<InstanceKey>,
    disassociate: BTreeSet<InstanceKey>,
}

/// Collects key registrations made by work items until the next flush.
///
/// Registering a key cancels a pending unregistration of the same key and
/// vice versa, so each key appears in at most one set.
#[derive(Default)]
pub struct ScopeKeyRegistry {
    pending: Mutex<PendingKeys>,
}

impl ScopeKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingKeys> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BookmarkScopeManager for ScopeKeyRegistry {
    fn has_keys_to_update(&self) -> bool {
        let pending = self.pending();
        !pending.associate.is_empty() || !pending.disassociate.is_empty()
    }

    fn keys_to_disassociate(&self) -> Vec<InstanceKey> {
        std::mem::take(&mut self.pending().disassociate)
            .into_iter()
            .collect()
    }

    fn keys_to_associate(&self) -> Vec<InstanceKey> {
        std::mem::take(&mut self.pending().associate)
            .into_iter()
            .collect()
    }

    fn register_key(&self, key: InstanceKey) {
        let mut pending = self.pending();
        pending.disassociate.remove(&key);
        pending.associate.insert(key);
    }

    fn unregister_key(&self, key: InstanceKey) {
        let mut pending = self.pending();
        pending.associate.remove(&key);
        pending.disassociate.insert(key);
    }
}
