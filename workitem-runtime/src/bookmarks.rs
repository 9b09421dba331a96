use std::collections::HashMap;
use workitem_core::{ActivityInstanceId, Bookmark, BookmarkManager};

/// Bookmarks of one workflow execution, grouped by owning instance.
#[derive(Debug, Default)]
pub struct InMemoryBookmarkManager {
    by_owner: HashMap<ActivityInstanceId, Vec<Bookmark>>,
}

impl InMemoryBookmarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookmarks owned by `owner`, in creation order.
    pub fn bookmarks(&self, owner: ActivityInstanceId) -> &[Bookmark] {
        self.by_owner.get(&owner).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total bookmarks across all owners.
    pub fn len(&self) -> usize {
        self.by_owner.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_owner.is_empty()
    }
}

impl BookmarkManager for InMemoryBookmarkManager {
    fn create_bookmark(&mut self, name: &str, owner: ActivityInstanceId) -> Bookmark {
        let bookmark = Bookmark {
            name: name.to_string(),
            owner,
        };
        tracing::trace!(instance_id = %owner, bookmark = %name, "Bookmark created");
        self.by_owner.entry(owner).or_default().push(bookmark.clone());
        bookmark
    }

    fn remove_bookmarks(&mut self, owner: ActivityInstanceId) -> usize {
        self.by_owner.remove(&owner).map_or(0, |removed| removed.len())
    }

    fn has_bookmarks(&self, owner: ActivityInstanceId) -> bool {
        self.by_owner.contains_key(&owner)
    }
}
