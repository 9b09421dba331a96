//! The work-item abstraction and its lifecycle.
//!
//! A work item is a discrete, resumable unit of execution bound to one
//! activity instance. It moves through
//! `constructed → scheduled → executed → post-processed → released → disposed`.
//! Binding increments the instance's busy count and release decrements it,
//! exactly once each, so an instance is completion eligible only when no
//! work item references it.

use crate::bookmark::BookmarkManager;
use crate::error::{FatalError, Fault};
use crate::executor::Executor;
use crate::instance::ActivityInstance;
use crate::pool::{Pooled, PooledWorkItem, Reusable};
use crate::trace::{self, TraceEvent};
use std::fmt;
use std::sync::Arc;

/// Fields shared by every work-item variant.
pub struct WorkItemState {
    activity_instance: Option<Arc<ActivityInstance>>,
    is_empty: bool,
    exception_to_propagate: Option<Fault>,
    workflow_abort: Option<Fault>,
    exit_no_persist_required: bool,
    released: bool,
}

impl WorkItemState {
    /// Bind to `instance`, incrementing its busy count.
    pub fn new(instance: Arc<ActivityInstance>) -> Self {
        instance.increment_busy_count();
        Self {
            activity_instance: Some(instance),
            is_empty: false,
            exception_to_propagate: None,
            workflow_abort: None,
            exit_no_persist_required: false,
            released: false,
        }
    }

    /// A no-op placeholder bound to `instance`.
    pub fn empty(instance: Arc<ActivityInstance>) -> Self {
        Self {
            is_empty: true,
            ..Self::new(instance)
        }
    }

    /// # Panics
    ///
    /// Panics if the item was cleared for reuse and not reinitialized.
    pub fn activity_instance(&self) -> &Arc<ActivityInstance> {
        self.activity_instance
            .as_ref()
            .expect("work item is not bound to an activity instance")
    }

    pub fn is_bound(&self) -> bool {
        self.activity_instance.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn set_empty(&mut self, is_empty: bool) {
        self.is_empty = is_empty;
    }

    pub fn exception_to_propagate(&self) -> Option<&Fault> {
        self.exception_to_propagate.as_ref()
    }

    /// # Panics
    ///
    /// Panics if a fault is already waiting to propagate. It must be consumed
    /// and cleared with [`exception_propagated`](Self::exception_propagated) first.
    pub fn set_exception_to_propagate(&mut self, fault: Fault) {
        assert!(
            self.exception_to_propagate.is_none(),
            "exception to propagate would be overwritten; call exception_propagated first"
        );
        self.exception_to_propagate = Some(fault);
    }

    /// Clear the propagated fault once the caller has consumed it.
    pub fn exception_propagated(&mut self) {
        self.exception_to_propagate = None;
    }

    pub fn workflow_abort(&self) -> Option<&Fault> {
        self.workflow_abort.as_ref()
    }

    pub fn take_workflow_abort(&mut self) -> Option<Fault> {
        self.workflow_abort.take()
    }

    /// Record the outcome of a flush step.
    ///
    /// Non-fatal faults become the workflow abort fault (the first one wins);
    /// fatal faults are handed back untouched.
    pub fn capture_abort(&mut self, result: Result<(), Fault>) -> Result<(), FatalError> {
        let Err(fault) = result else {
            return Ok(());
        };
        let fault = fault.into_fatal()?;
        match &self.workflow_abort {
            Some(first) => tracing::warn!(
                error = %fault,
                first = %first,
                "Work item already carries an abort fault, keeping the first"
            ),
            None => self.workflow_abort = Some(fault),
        }
        Ok(())
    }

    pub fn exit_no_persist_required(&self) -> bool {
        self.exit_no_persist_required
    }

    /// Make release leave the executor's no-persist region.
    pub fn require_exit_no_persist(&mut self) {
        self.exit_no_persist_required = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// # Panics
    ///
    /// Panics on a second release, which would decrement the busy count twice.
    fn release(&mut self, executor: &dyn Executor) {
        assert!(!self.released, "work item released twice");
        self.released = true;
        self.activity_instance().decrement_busy_count();

        if self.exit_no_persist_required {
            executor.exit_no_persist();
        }
    }

    /// Reset every per-use field. Called by [`Reusable::clear_for_reuse`].
    pub fn clear_for_reuse(&mut self) {
        self.exception_to_propagate = None;
        self.workflow_abort = None;
        self.activity_instance = None;
        self.exit_no_persist_required = false;
        self.released = false;
        self.is_empty = false;
    }

    /// Rebind a cleared item, incrementing the new instance's busy count.
    /// Called by [`Reusable::reinitialize`].
    ///
    /// # Panics
    ///
    /// Panics if the item is still bound.
    pub fn reinitialize(&mut self, instance: Arc<ActivityInstance>) {
        assert!(
            self.activity_instance.is_none(),
            "reinitializing a work item that was not cleared for reuse"
        );
        instance.increment_busy_count();
        self.activity_instance = Some(instance);
    }
}

impl fmt::Debug for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemState")
            .field(
                "activity_instance",
                &self.activity_instance.as_ref().map(|i| i.id()),
            )
            .field("is_empty", &self.is_empty)
            .field("exception_to_propagate", &self.exception_to_propagate)
            .field("workflow_abort", &self.workflow_abort)
            .field("exit_no_persist_required", &self.exit_no_persist_required)
            .field("released", &self.released)
            .finish()
    }
}

/// A schedulable unit of execution.
///
/// Variants embed a [`WorkItemState`] and supply the effect. Trace hooks
/// default to the generic runtime-work-item channels.
pub trait WorkItem: Send {
    fn state(&self) -> &WorkItemState;

    fn state_mut(&mut self) -> &mut WorkItemState;

    /// Whether the item may still run, e.g. its instance has not been torn down.
    fn is_valid(&self) -> bool;

    /// Instance whose execution properties apply while the item runs.
    fn property_manager_owner(&self) -> Option<&Arc<ActivityInstance>>;

    /// Instance reported as the source of a propagated fault.
    fn original_exception_source(&self) -> &Arc<ActivityInstance> {
        self.state().activity_instance()
    }

    /// Perform the item's effect. Returns `true` if it completed synchronously.
    ///
    /// Non-fatal faults are captured into the propagated fault by the variant;
    /// only fatal faults come back as `Err`.
    fn execute(
        &mut self,
        executor: &dyn Executor,
        bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError>;

    /// Variant bookkeeping run after `execute`, whether or not it completed synchronously.
    fn post_process(&mut self, executor: &dyn Executor);

    fn trace_scheduled(&self) {
        trace::runtime_work_item(TraceEvent::Scheduled, self.state().activity_instance());
    }

    fn trace_starting(&self) {
        trace::runtime_work_item(TraceEvent::Starting, self.state().activity_instance());
    }

    fn trace_completed(&self) {
        trace::runtime_work_item(TraceEvent::Completed, self.state().activity_instance());
    }
}

/// A work item as held by the executor, tagged with its reuse capability.
pub enum ScheduledItem {
    /// Discarded on dispose.
    Transient(Box<dyn WorkItem>),
    /// Returned to its pool on dispose.
    Pooled(Box<dyn PooledWorkItem>),
}

impl ScheduledItem {
    pub fn transient(item: impl WorkItem + 'static) -> Self {
        ScheduledItem::Transient(Box::new(item))
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, ScheduledItem::Pooled(_))
    }

    pub fn work_item(&self) -> &dyn WorkItem {
        match self {
            ScheduledItem::Transient(item) => item.as_ref(),
            ScheduledItem::Pooled(item) => item.work_item(),
        }
    }

    pub fn work_item_mut(&mut self) -> &mut dyn WorkItem {
        match self {
            ScheduledItem::Transient(item) => item.as_mut(),
            ScheduledItem::Pooled(item) => item.work_item_mut(),
        }
    }

    pub fn state(&self) -> &WorkItemState {
        self.work_item().state()
    }

    pub fn state_mut(&mut self) -> &mut WorkItemState {
        self.work_item_mut().state_mut()
    }

    pub fn activity_instance(&self) -> &Arc<ActivityInstance> {
        self.state().activity_instance()
    }

    pub fn execute(
        &mut self,
        executor: &dyn Executor,
        bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError> {
        self.work_item_mut().execute(executor, bookmarks)
    }

    pub fn post_process(&mut self, executor: &dyn Executor) {
        self.work_item_mut().post_process(executor);
    }

    pub fn trace_scheduled(&self) {
        self.work_item().trace_scheduled();
    }

    pub fn trace_starting(&self) {
        self.work_item().trace_starting();
    }

    pub fn exception_propagated(&mut self) {
        self.state_mut().exception_propagated();
    }

    /// Drop this item's reference on its instance and leave any no-persist
    /// region it entered.
    ///
    /// # Panics
    ///
    /// Panics if the item was already released.
    pub fn release(&mut self, executor: &dyn Executor) {
        self.state_mut().release(executor);
    }

    /// Final step of the lifecycle: trace completion when verbose tracing is
    /// on, then return pooled items to their pool and drop the rest.
    pub fn dispose(self) {
        if tracing::enabled!(tracing::Level::TRACE) {
            self.work_item().trace_completed();
        }

        match self {
            ScheduledItem::Pooled(item) => item.release_to_pool(),
            ScheduledItem::Transient(item) => drop(item),
        }
    }
}

impl<T: Reusable> From<Pooled<T>> for ScheduledItem {
    fn from(item: Pooled<T>) -> Self {
        ScheduledItem::Pooled(Box::new(item))
    }
}

impl fmt::Debug for ScheduledItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_pooled() { "Pooled" } else { "Transient" };
        f.debug_tuple(kind).field(self.state()).finish()
    }
}
