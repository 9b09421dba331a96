//! Instance store trait for correlation keys and instance checkpoints.
//!
//! The store owns two pieces of durable state: which workflow instance each
//! correlation key resolves to, and the last checkpoint saved for each
//! instance. Implementations may back either with any storage (in-memory,
//! Redis, PostgreSQL, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use workitem_core::{Fault, InstanceKey};

/// Error type for instance store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Checkpoint or key not found.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The key already resolves to a different instance.
    #[error("Key '{key}' is already associated with instance {owner}")]
    KeyCollision { key: InstanceKey, owner: String },
    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for Fault {
    fn from(error: StoreError) -> Self {
        Fault::Store(error.to_string())
    }
}

/// Durable state of one workflow instance at a persistence point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCheckpoint {
    pub instance_id: String,
    /// Keys associated with the instance when the checkpoint was taken.
    pub keys: Vec<InstanceKey>,
    /// Work items still queued or suspended.
    pub pending_work_items: usize,
    pub saved_at: DateTime<Utc>,
}

impl InstanceCheckpoint {
    pub fn new(instance_id: impl Into<String>, keys: Vec<InstanceKey>, pending: usize) -> Self {
        Self {
            instance_id: instance_id.into(),
            keys,
            pending_work_items: pending,
            saved_at: Utc::now(),
        }
    }
}

/// Durable storage consulted by the executor.
///
/// # Example
///
/// ```rust,ignore
/// use workitem_persistence::{InMemoryInstanceStore, InstanceStore};
///
/// let store = InMemoryInstanceStore::new();
/// store.associate_keys("order-flow-1", vec![InstanceKey::new("order:42")]).await?;
/// assert_eq!(store.resolve_key(&InstanceKey::new("order:42")).await?, "order-flow-1");
/// ```
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Associate every key with `owner`.
    ///
    /// Re-associating a key the owner already holds is a no-op. The call is
    /// all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyCollision` if any key resolves to another instance.
    async fn associate_keys(&self, owner: &str, keys: Vec<InstanceKey>) -> Result<(), StoreError>;

    /// Drop `owner`'s association with each key. Keys it does not hold are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be reached.
    async fn disassociate_keys(&self, owner: &str, keys: Vec<InstanceKey>)
    -> Result<(), StoreError>;

    /// Find the instance a key resolves to.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key is not associated.
    async fn resolve_key(&self, key: &InstanceKey) -> Result<String, StoreError>;

    /// Save a checkpoint, replacing any earlier one for the same instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the checkpoint cannot be saved.
    async fn save_checkpoint(&self, checkpoint: InstanceCheckpoint) -> Result<(), StoreError>;

    /// Load the last checkpoint saved for an instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if none was saved.
    async fn load_checkpoint(&self, instance_id: &str) -> Result<InstanceCheckpoint, StoreError>;
}
