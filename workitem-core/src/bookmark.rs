//! Bookmark collaborators consumed by work items.

use crate::instance::ActivityInstanceId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A correlation key that lets the instance store find a workflow instance
/// from external data (an order number, a message id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named resumption point owned by an activity instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub owner: ActivityInstanceId,
}

/// Tracks which correlation keys changed since the last flush.
///
/// Implementations are shared with continuations on foreign threads, so every
/// method takes `&self`.
pub trait BookmarkScopeManager: Send + Sync {
    /// Whether any key is waiting to be associated or disassociated.
    fn has_keys_to_update(&self) -> bool;

    /// Take the keys marked for removal. Returns an empty vector if none.
    fn keys_to_disassociate(&self) -> Vec<InstanceKey>;

    /// Take the keys marked for association. Returns an empty vector if none.
    fn keys_to_associate(&self) -> Vec<InstanceKey>;

    /// Mark a key for association with the running instance.
    fn register_key(&self, key: InstanceKey);

    /// Mark a key for disassociation from the running instance.
    fn unregister_key(&self, key: InstanceKey);
}

/// Owns the bookmarks of one workflow execution. Driven only from the
/// scheduling thread.
pub trait BookmarkManager: Send {
    fn create_bookmark(&mut self, name: &str, owner: ActivityInstanceId) -> Bookmark;

    /// Remove every bookmark the instance owns, returning how many were removed.
    fn remove_bookmarks(&mut self, owner: ActivityInstanceId) -> usize;

    fn has_bookmarks(&self, owner: ActivityInstanceId) -> bool;
}
