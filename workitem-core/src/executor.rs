use crate::bookmark::{BookmarkScopeManager, InstanceKey};
use crate::completion::Completion;
use crate::error::Fault;
use crate::tracking::TrackingRecord;
use crate::work_item::ScheduledItem;

/// The scheduler that owns the ready queue and drives work items.
///
/// Work items only see the executor through this trait. A continuation holds
/// it as `Arc<dyn Executor>` and may call into it from the thread that
/// resolved a deferred operation, so implementations must be thread safe.
pub trait Executor: Send + Sync {
    /// Scope manager holding the correlation keys changed by the current work item.
    fn bookmark_scope_manager(&self) -> &dyn BookmarkScopeManager;

    /// Drop keys from the running instance. Local bookkeeping only; never deferred.
    fn disassociate_keys(&self, keys: Vec<InstanceKey>) -> Result<(), Fault>;

    /// Start associating keys with the running instance in the instance store.
    fn begin_associate_keys(&self, keys: Vec<InstanceKey>) -> Completion;

    /// Whether tracking records are queued and waiting for the sink.
    fn has_pending_tracking_records(&self) -> bool;

    /// Start delivering every queued tracking record to the sink.
    fn begin_track_pending_records(&self) -> Completion;

    /// Queue a tracking record for the next tracking flush.
    fn add_tracking_record(&self, record: TrackingRecord);

    /// Resume finishing a work item whose key association completed later.
    fn finish_work_item(&self, item: ScheduledItem);

    /// Resume finishing a work item whose tracking flush completed later.
    ///
    /// Distinct from [`finish_work_item`](Self::finish_work_item): records may
    /// have been queued while the flush was outstanding.
    fn finish_work_item_after_tracking(&self, item: ScheduledItem);

    /// Enter a region during which the instance must not be persisted.
    fn enter_no_persist(&self);

    /// Leave a region entered with [`enter_no_persist`](Self::enter_no_persist).
    fn exit_no_persist(&self);
}
