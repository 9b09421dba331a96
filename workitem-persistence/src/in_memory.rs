//! In-memory implementation of [`InstanceStore`].
//!
//! Keys and checkpoints live in HashMaps behind `RwLock`s. Useful for tests
//! and as a reference implementation.

use crate::store::{InstanceCheckpoint, InstanceStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use workitem_core::InstanceKey;

/// Thread-safe in-memory instance store. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryInstanceStore {
    keys: Arc<RwLock<HashMap<InstanceKey, String>>>,
    checkpoints: Arc<RwLock<HashMap<String, InstanceCheckpoint>>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently associated with `owner`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the lock is poisoned.
    pub fn keys_of(&self, owner: &str) -> Result<Vec<InstanceKey>, StoreError> {
        let keys = self
            .keys
            .read()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        let mut owned: Vec<_> = keys
            .iter()
            .filter(|(_, holder)| holder.as_str() == owner)
            .map(|(key, _)| key.clone())
            .collect();
        owned.sort();
        Ok(owned)
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn associate_keys(&self, owner: &str, keys: Vec<InstanceKey>) -> Result<(), StoreError> {
        let mut map = self
            .keys
            .write()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;

        if let Some((key, holder)) = keys
            .iter()
            .find_map(|key| map.get(key).filter(|h| h.as_str() != owner).map(|h| (key, h)))
        {
            return Err(StoreError::KeyCollision {
                key: key.clone(),
                owner: holder.clone(),
            });
        }

        for key in keys {
            tracing::trace!(instance_id = %owner, key = %key, "Associating key");
            map.insert(key, owner.to_string());
        }
        Ok(())
    }

    async fn disassociate_keys(
        &self,
        owner: &str,
        keys: Vec<InstanceKey>,
    ) -> Result<(), StoreError> {
        let mut map = self
            .keys
            .write()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;

        for key in keys {
            if map.get(&key).is_some_and(|holder| holder == owner) {
                map.remove(&key);
            } else {
                tracing::debug!(instance_id = %owner, key = %key, "Key not held, skipping");
            }
        }
        Ok(())
    }

    async fn resolve_key(&self, key: &InstanceKey) -> Result<String, StoreError> {
        let map = self
            .keys
            .read()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        map.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn save_checkpoint(&self, checkpoint: InstanceCheckpoint) -> Result<(), StoreError> {
        let mut checkpoints = self
            .checkpoints
            .write()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        checkpoints.insert(checkpoint.instance_id.clone(), checkpoint);
        Ok(())
    }

    async fn load_checkpoint(&self, instance_id: &str) -> Result<InstanceCheckpoint, StoreError> {
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))?;
        checkpoints
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(instance_id.to_string()))
    }
}
