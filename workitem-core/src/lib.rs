//! Work-item scheduling core for a durable workflow executor.
//!
//! A workflow executor keeps a ready queue of [`WorkItem`]s. Each item is
//! bound to one [`ActivityInstance`], runs on the scheduling thread, and may
//! leave behind deferred I/O (correlation key association, tracking delivery)
//! that has to finish before the item can be released.
//!
//! # Architecture
//!
//! - **WorkItem / ScheduledItem**: the unit of execution and its lifecycle,
//!   with the busy-count contract on the bound instance.
//! - **Executor**: the contract a scheduler offers to its work items.
//! - **Completion**: one-shot deferred results that are consumed inline when
//!   they finish during the call and by a continuation otherwise.
//! - **flush**: the two deferred flushes and their continuations.
//! - **WorkItemPool**: reuse of hot-path work items.
//! - **trace**: lifecycle events on dedicated `tracing` targets.
//!
//! # Example
//!
//! ```rust,ignore
//! use workitem_core::flush::{self, FlushOutcome};
//!
//! // After executing `item`, push key changes before finishing it.
//! if executor.bookmark_scope_manager().has_keys_to_update() {
//!     match flush::flush_bookmark_scope_keys(item, &executor)? {
//!         FlushOutcome::Complete(item) => executor.finish_work_item(item),
//!         FlushOutcome::Pending => {} // the continuation finishes it
//!     }
//! }
//! ```

pub mod bookmark;
pub mod completion;
pub mod error;
pub mod executor;
pub mod flush;
pub mod instance;
pub mod pool;
pub mod trace;
pub mod tracking;
pub mod work_item;

#[cfg(test)]
mod testing;

// Re-exports
pub use bookmark::{Bookmark, BookmarkManager, BookmarkScopeManager, InstanceKey};
pub use completion::{Completion, CompletionResult, CompletionSource, Settled};
pub use error::{FatalError, Fault};
pub use executor::Executor;
pub use flush::{CallbackData, FlushOutcome};
pub use instance::{ActivityDescriptor, ActivityInstance, ActivityInstanceId};
pub use pool::{Pooled, PooledWorkItem, Reusable, WorkItemPool};
pub use tracking::{ActivityRecordState, TrackingRecord};
pub use work_item::{ScheduledItem, WorkItem, WorkItemState};
