//! Reference runtime for the work-item scheduling core.
//!
//! [`ActivityExecutor`] drives the work items of one workflow instance
//! against an [`InstanceStore`](workitem_persistence::InstanceStore) and a
//! [`TrackingParticipant`], finishing each item inline when its flushes
//! complete during the call and through a continuation when they do not.

mod bookmarks;
mod config;
mod executor;
mod items;
mod scope;
mod tracking;

// Re-exports
pub use bookmarks::InMemoryBookmarkManager;
pub use config::ExecutorConfig;
pub use executor::{ActivityExecutor, ExecutionStatus, ExecutorError, PropagatedFault};
pub use items::{
    ActivityBody, ActivityContext, ActivityStatus, CallbackWorkItem, EmptyWorkItem,
    ExecuteActivityWorkItem, activity_fn,
};
pub use scope::ScopeKeyRegistry;
pub use tracking::{InMemoryTrackingParticipant, TrackingError, TrackingParticipant};

pub use workitem_persistence as persistence;
