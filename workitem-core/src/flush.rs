//! Deferred flushes that can suspend a work item's completion.
//!
//! Both flushes follow the same shape: issue one operation through the
//! executor, consume its result inline when it already completed, otherwise
//! move the work item into a [`CallbackData`] and let the continuation finish
//! it. A non-fatal fault never stalls the scheduler: it is captured as the
//! work item's abort fault and the item still reaches a finish path.

use crate::completion::{CompletionResult, Settled};
use crate::error::{self, FatalError};
use crate::executor::Executor;
use crate::work_item::ScheduledItem;
use std::fmt;
use std::sync::Arc;

/// Result of a flush call.
#[derive(Debug)]
pub enum FlushOutcome {
    /// The flush finished during the call; the caller keeps driving the item.
    Complete(ScheduledItem),
    /// The item now belongs to a continuation, which will hand it back to
    /// the executor once the operation resolves.
    Pending,
}

/// Correlates a deferred completion with the executor and work item that
/// issued it. Built once per deferred call and only ever taken apart.
pub struct CallbackData {
    executor: Arc<dyn Executor>,
    work_item: ScheduledItem,
}

impl CallbackData {
    pub fn new(executor: Arc<dyn Executor>, work_item: ScheduledItem) -> Self {
        Self {
            executor,
            work_item,
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn work_item(&self) -> &ScheduledItem {
        &self.work_item
    }

    pub fn into_parts(self) -> (Arc<dyn Executor>, ScheduledItem) {
        (self.executor, self.work_item)
    }
}

impl fmt::Debug for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackData")
            .field("work_item", &self.work_item)
            .finish_non_exhaustive()
    }
}

/// Signature shared by the two flush continuations.
pub type CompletionCallback = fn(CallbackData, CompletionResult);

/// Continuation for a key association that completed after `flush_bookmark_scope_keys` returned.
pub static ASSOCIATE_CALLBACK: CompletionCallback = on_associate_complete;

/// Continuation for a tracking flush that completed after `flush_tracking` returned.
pub static TRACKING_CALLBACK: CompletionCallback = on_tracking_complete;

fn on_associate_complete(data: CallbackData, result: CompletionResult) {
    let (executor, mut item) = data.into_parts();
    if let Err(fatal) = item.state_mut().capture_abort(result) {
        error::escalate(fatal);
    }
    tracing::trace!(
        instance_id = %item.activity_instance().id(),
        "Deferred key association resolved"
    );
    executor.finish_work_item(item);
}

fn on_tracking_complete(data: CallbackData, result: CompletionResult) {
    let (executor, mut item) = data.into_parts();
    if let Err(fatal) = item.state_mut().capture_abort(result) {
        error::escalate(fatal);
    }
    tracing::trace!(
        instance_id = %item.activity_instance().id(),
        "Deferred tracking flush resolved"
    );
    executor.finish_work_item_after_tracking(item);
}

/// Push the scope manager's pending key changes to the instance store.
///
/// Keys marked for removal are disassociated first, synchronously. Keys
/// marked for association go out in one deferred request. A continuation is
/// registered only when that request does not complete during the call.
///
/// # Errors
///
/// Returns a [`FatalError`] untouched; every other fault is captured as the
/// item's abort fault and the flush reports complete.
///
/// # Panics
///
/// Panics if the scope manager has no keys to update.
pub fn flush_bookmark_scope_keys(
    mut item: ScheduledItem,
    executor: &Arc<dyn Executor>,
) -> Result<FlushOutcome, FatalError> {
    let scope = executor.bookmark_scope_manager();
    assert!(
        scope.has_keys_to_update(),
        "flush_bookmark_scope_keys called without pending key updates"
    );

    let to_disassociate = scope.keys_to_disassociate();
    if !to_disassociate.is_empty() {
        let result = executor.disassociate_keys(to_disassociate);
        if result.is_err() {
            item.state_mut().capture_abort(result)?;
            return Ok(FlushOutcome::Complete(item));
        }
    }

    let to_associate = scope.keys_to_associate();
    if to_associate.is_empty() {
        return Ok(FlushOutcome::Complete(item));
    }

    let completion = executor.begin_associate_keys(to_associate);
    let data = CallbackData::new(Arc::clone(executor), item);
    match completion.settle(data, ASSOCIATE_CALLBACK) {
        Settled::Synchronous(data, result) => {
            let (_, mut item) = data.into_parts();
            item.state_mut().capture_abort(result)?;
            Ok(FlushOutcome::Complete(item))
        }
        Settled::Deferred => Ok(FlushOutcome::Pending),
    }
}

/// Deliver queued tracking records to the tracking sink.
///
/// A deferred delivery finishes through
/// [`Executor::finish_work_item_after_tracking`].
///
/// # Errors
///
/// Returns a [`FatalError`] untouched; every other fault is captured as the
/// item's abort fault and the flush reports complete.
///
/// # Panics
///
/// Panics if the executor has no pending tracking records.
pub fn flush_tracking(
    item: ScheduledItem,
    executor: &Arc<dyn Executor>,
) -> Result<FlushOutcome, FatalError> {
    assert!(
        executor.has_pending_tracking_records(),
        "flush_tracking called without pending tracking records"
    );

    let completion = executor.begin_track_pending_records();
    let data = CallbackData::new(Arc::clone(executor), item);
    match completion.settle(data, TRACKING_CALLBACK) {
        Settled::Synchronous(data, result) => {
            let (_, mut item) = data.into_parts();
            item.state_mut().capture_abort(result)?;
            Ok(FlushOutcome::Complete(item))
        }
        Settled::Deferred => Ok(FlushOutcome::Pending),
    }
}
