//! Reference executor driving work items for one workflow instance.
//!
//! The executor owns a ready queue and runs one work item at a time. After an
//! item executes, its key changes and tracking records are flushed before it
//! is released. When a flush cannot finish inline, the item moves into a
//! continuation and the run loop waits until that continuation completes it.
//!
//! Store and tracking calls are async. Each one is polled once on the calling
//! thread; a future that is ready at once completes the flush synchronously,
//! anything else is spawned on the tokio runtime and resolves the flush from
//! there.

use crate::bookmarks::InMemoryBookmarkManager;
use crate::config::ExecutorConfig;
use crate::items::{ActivityBody, ExecuteActivityWorkItem};
use crate::scope::ScopeKeyRegistry;
use crate::tracking::TrackingParticipant;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use workitem_core::flush::{self, FlushOutcome};
use workitem_core::{
    ActivityDescriptor, ActivityInstance, ActivityInstanceId, Bookmark, BookmarkManager,
    BookmarkScopeManager, Completion, CompletionResult, Executor, FatalError, Fault, InstanceKey,
    ScheduledItem, TrackingRecord, WorkItemPool, error,
};
use workitem_persistence::{InstanceCheckpoint, InstanceStore, StoreError};

/// Error type for executor operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A work item holds the instance in a no-persist region.
    #[error("Cannot persist inside a no-persist region")]
    NoPersistRegion,
    /// A work item is between execution and release.
    #[error("Cannot persist while a work item is in flight")]
    WorkItemInFlight,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// A fault raised by an activity and handed up by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagatedFault {
    pub source: ActivityInstanceId,
    pub message: String,
}

/// Outcome of a [`ActivityExecutor::run`] call.
#[derive(Debug)]
pub enum ExecutionStatus {
    /// The ready queue drained and nothing is suspended.
    Completed,
    /// The ready queue drained; suspended work items wait for a resume.
    Idle,
    /// The ready queue drained after activities propagated faults.
    Faulted(Vec<PropagatedFault>),
    /// A flush failed. Remaining work items were discarded.
    Aborted(Fault),
}

/// Runs the work items of one workflow instance.
///
/// # Example
///
/// ```rust,ignore
/// let executor = ActivityExecutor::new(
///     ExecutorConfig::new("order-flow-1"),
///     Arc::new(InMemoryInstanceStore::new()),
///     Arc::new(InMemoryTrackingParticipant::new()),
/// );
/// let instance = executor.create_instance(ActivityDescriptor::new("Receive", "Await order"));
/// executor.schedule_activity(&instance, activity_fn(|ctx| {
///     ctx.register_key(InstanceKey::new("order:42"));
///     Ok(ActivityStatus::Completed)
/// }));
/// let status = executor.run().await?;
/// ```
pub struct ActivityExecutor {
    me: Weak<ActivityExecutor>,
    config: ExecutorConfig,
    store: Arc<dyn InstanceStore>,
    tracking: Arc<dyn TrackingParticipant>,
    scope: ScopeKeyRegistry,
    bookmarks: Mutex<InMemoryBookmarkManager>,
    ready: Mutex<VecDeque<ScheduledItem>>,
    suspended: Mutex<Vec<ScheduledItem>>,
    pending_records: Mutex<Vec<TrackingRecord>>,
    pending_disassociations: Arc<Mutex<Vec<InstanceKey>>>,
    associated: Arc<Mutex<BTreeSet<InstanceKey>>>,
    no_persist: AtomicUsize,
    in_flight: AtomicBool,
    resume: Notify,
    deferred_task: Mutex<Option<JoinHandle<()>>>,
    abort: Mutex<Option<Fault>>,
    propagated: Mutex<Vec<PropagatedFault>>,
    activity_pool: Arc<WorkItemPool<ExecuteActivityWorkItem>>,
    next_instance_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActivityExecutor {
    pub fn new(
        config: ExecutorConfig,
        store: Arc<dyn InstanceStore>,
        tracking: Arc<dyn TrackingParticipant>,
    ) -> Arc<Self> {
        let activity_pool = WorkItemPool::new(config.pool_capacity());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            store,
            tracking,
            scope: ScopeKeyRegistry::new(),
            bookmarks: Mutex::new(InMemoryBookmarkManager::new()),
            ready: Mutex::new(VecDeque::new()),
            suspended: Mutex::new(Vec::new()),
            pending_records: Mutex::new(Vec::new()),
            pending_disassociations: Arc::new(Mutex::new(Vec::new())),
            associated: Arc::new(Mutex::new(BTreeSet::new())),
            no_persist: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
            resume: Notify::new(),
            deferred_task: Mutex::new(None),
            abort: Mutex::new(None),
            propagated: Mutex::new(Vec::new()),
            activity_pool,
            next_instance_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Create an activity instance with the next free id.
    pub fn create_instance(&self, activity: ActivityDescriptor) -> Arc<ActivityInstance> {
        let id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(ActivityInstance::new(ActivityInstanceId::new(id), activity))
    }

    /// Append a work item to the ready queue.
    pub fn schedule(&self, item: ScheduledItem) {
        item.trace_scheduled();
        lock(&self.ready).push_back(item);
    }

    /// Schedule `body` for `instance` on a pooled activity work item.
    pub fn schedule_activity(&self, instance: &Arc<ActivityInstance>, body: Arc<dyn ActivityBody>) {
        let mut item = self
            .activity_pool
            .acquire(Arc::clone(instance), ExecuteActivityWorkItem::new);
        item.set_body(body);
        self.schedule(item.into());
    }

    /// Move the suspended work items of `owner` back to the ready queue and
    /// drop its bookmarks. Returns how many items were resumed.
    pub fn resume_suspended(&self, owner: ActivityInstanceId) -> usize {
        let resumed: Vec<_> = {
            let mut suspended = lock(&self.suspended);
            let (resumed, kept): (Vec<_>, Vec<_>) = mem::take(&mut *suspended)
                .into_iter()
                .partition(|item: &ScheduledItem| item.activity_instance().id() == owner);
            *suspended = kept;
            resumed
        };

        lock(&self.bookmarks).remove_bookmarks(owner);
        let count = resumed.len();
        for item in resumed {
            self.schedule(item);
        }
        tracing::debug!(instance_id = %owner, count, "Resumed suspended work items");
        count
    }

    pub fn bookmarks(&self, owner: ActivityInstanceId) -> Vec<Bookmark> {
        lock(&self.bookmarks).bookmarks(owner).to_vec()
    }

    /// Keys successfully associated with this instance, sorted.
    pub fn associated_keys(&self) -> Vec<InstanceKey> {
        lock(&self.associated).iter().cloned().collect()
    }

    pub fn is_in_no_persist(&self) -> bool {
        self.no_persist.load(Ordering::Acquire) > 0
    }

    /// Cleared activity work items waiting for reuse.
    pub fn pooled_items(&self) -> usize {
        self.activity_pool.available()
    }

    pub fn pending_work_items(&self) -> usize {
        lock(&self.ready).len() + lock(&self.suspended).len()
    }

    /// Run work items until the ready queue is empty or the workflow aborts.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Fatal` if a work item raised a fatal fault. The
    /// failing item is dropped without release, so the host is expected to
    /// shut the instance down rather than run it again. Panics raised inside
    /// a deferred continuation resume on the caller.
    pub async fn run(&self) -> Result<ExecutionStatus, ExecutorError> {
        tracing::debug!(instance_id = %self.config.instance_id(), "Executor running");
        loop {
            self.wait_for_in_flight().await;

            let abort = lock(&self.abort).take();
            if let Some(fault) = abort {
                let discarded = self.discard_pending();
                tracing::warn!(
                    instance_id = %self.config.instance_id(),
                    error = %fault,
                    discarded,
                    "Workflow aborted"
                );
                return Ok(ExecutionStatus::Aborted(fault));
            }

            let next = lock(&self.ready).pop_front();
            let Some(item) = next else {
                break;
            };
            if let Err(e) = self.step(item) {
                self.in_flight.store(false, Ordering::Release);
                return Err(e.into());
            }
        }

        let faults = mem::take(&mut *lock(&self.propagated));
        if !faults.is_empty() {
            return Ok(ExecutionStatus::Faulted(faults));
        }
        if !lock(&self.suspended).is_empty() {
            return Ok(ExecutionStatus::Idle);
        }
        tracing::debug!(instance_id = %self.config.instance_id(), "Ready queue drained");
        Ok(ExecutionStatus::Completed)
    }

    /// Checkpoint the instance, first delivering key disassociations made
    /// since the last checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::NoPersistRegion` while any work item holds a
    /// no-persist region, `ExecutorError::WorkItemInFlight` while a flush is
    /// outstanding, and `ExecutorError::Store` if the store fails.
    pub async fn persist(&self) -> Result<InstanceCheckpoint, ExecutorError> {
        if self.is_in_no_persist() {
            return Err(ExecutorError::NoPersistRegion);
        }
        if self.in_flight.load(Ordering::Acquire) {
            return Err(ExecutorError::WorkItemInFlight);
        }

        let owner = self.config.instance_id();
        let keys = mem::take(&mut *lock(&self.pending_disassociations));
        if !keys.is_empty()
            && let Err(e) = self.store.disassociate_keys(owner, keys.clone()).await
        {
            lock(&self.pending_disassociations).extend(keys);
            return Err(e.into());
        }

        let checkpoint =
            InstanceCheckpoint::new(owner, self.associated_keys(), self.pending_work_items());
        self.store.save_checkpoint(checkpoint.clone()).await?;
        tracing::info!(
            instance_id = %owner,
            keys = checkpoint.keys.len(),
            pending = checkpoint.pending_work_items,
            "Instance persisted"
        );
        Ok(checkpoint)
    }

    fn shared(&self) -> Result<Arc<dyn Executor>, FatalError> {
        self.me
            .upgrade()
            .map(|executor| executor as Arc<dyn Executor>)
            .ok_or_else(|| FatalError::StateCorrupted("executor dropped while running".into()))
    }

    async fn wait_for_in_flight(&self) {
        while self.in_flight.load(Ordering::Acquire) {
            let task = lock(&self.deferred_task).take();
            match task {
                Some(task) => {
                    if let Err(e) = task.await
                        && e.is_panic()
                    {
                        std::panic::resume_unwind(e.into_panic());
                    }
                }
                None => self.resume.notified().await,
            }
        }
    }

    fn step(&self, mut item: ScheduledItem) -> Result<(), FatalError> {
        if !item.work_item().is_valid() {
            tracing::debug!(
                instance_id = %item.activity_instance().id(),
                "Skipping invalid work item"
            );
            item.release(self);
            item.dispose();
            return Ok(());
        }

        item.trace_starting();
        let completed = {
            let mut bookmarks = lock(&self.bookmarks);
            item.execute(self, &mut *bookmarks)?
        };
        item.post_process(self);

        if !completed {
            tracing::debug!(
                instance_id = %item.activity_instance().id(),
                "Work item suspended"
            );
            lock(&self.suspended).push(item);
            return Ok(());
        }

        self.in_flight.store(true, Ordering::Release);
        if self.scope.has_keys_to_update() {
            match flush::flush_bookmark_scope_keys(item, &self.shared()?)? {
                FlushOutcome::Complete(item) => self.try_finish_work_item(item),
                FlushOutcome::Pending => Ok(()),
            }
        } else {
            self.try_finish_work_item(item)
        }
    }

    fn try_finish_work_item(&self, item: ScheduledItem) -> Result<(), FatalError> {
        if !self.has_pending_tracking_records() {
            self.complete_work_item(item);
            return Ok(());
        }
        match flush::flush_tracking(item, &self.shared()?)? {
            FlushOutcome::Complete(item) => self.try_finish_after_tracking(item),
            FlushOutcome::Pending => Ok(()),
        }
    }

    fn try_finish_after_tracking(&self, item: ScheduledItem) -> Result<(), FatalError> {
        if item.state().workflow_abort().is_none() && self.has_pending_tracking_records() {
            tracing::debug!(
                instance_id = %item.activity_instance().id(),
                "Tracking records queued during flush, flushing again"
            );
            return self.try_finish_work_item(item);
        }
        self.complete_work_item(item);
        Ok(())
    }

    fn complete_work_item(&self, mut item: ScheduledItem) {
        if let Some(fault) = item.state_mut().take_workflow_abort() {
            let mut abort = lock(&self.abort);
            match abort.as_ref() {
                Some(first) => tracing::warn!(
                    error = %fault,
                    first = %first,
                    "Workflow already aborting, keeping the first fault"
                ),
                None => *abort = Some(fault),
            }
        }

        let propagated = item
            .state()
            .exception_to_propagate()
            .map(|fault| PropagatedFault {
                source: item.work_item().original_exception_source().id(),
                message: fault.to_string(),
            });
        if let Some(fault) = propagated {
            tracing::warn!(
                instance_id = %fault.source,
                error = %fault.message,
                "Activity fault propagated"
            );
            lock(&self.propagated).push(fault);
            item.exception_propagated();
        }

        item.release(self);
        item.dispose();

        self.in_flight.store(false, Ordering::Release);
        self.resume.notify_one();
    }

    fn discard_pending(&self) -> usize {
        let mut items: Vec<_> = lock(&self.ready).drain(..).collect();
        items.extend(lock(&self.suspended).drain(..));
        let count = items.len();
        for mut item in items {
            item.release(self);
            item.dispose();
        }
        count
    }

    /// Turn an async collaborator call into a [`Completion`].
    fn bridge<F>(&self, future: F) -> Completion
    where
        F: Future<Output = CompletionResult> + Send + 'static,
    {
        let mut future = Box::pin(future);
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => Completion::ready(result),
            Poll::Pending => {
                let (source, completion) = Completion::deferred();
                let task = tokio::spawn(async move {
                    source.resolve(future.await);
                });
                *lock(&self.deferred_task) = Some(task);
                self.resume.notify_one();
                completion
            }
        }
    }
}

impl Executor for ActivityExecutor {
    fn bookmark_scope_manager(&self) -> &dyn BookmarkScopeManager {
        &self.scope
    }

    fn disassociate_keys(&self, keys: Vec<InstanceKey>) -> Result<(), Fault> {
        {
            let mut associated = lock(&self.associated);
            for key in &keys {
                associated.remove(key);
            }
        }
        tracing::trace!(count = keys.len(), "Keys queued for disassociation");
        lock(&self.pending_disassociations).extend(keys);
        Ok(())
    }

    fn begin_associate_keys(&self, keys: Vec<InstanceKey>) -> Completion {
        let store = Arc::clone(&self.store);
        let associated = Arc::clone(&self.associated);
        let pending_disassociations = Arc::clone(&self.pending_disassociations);
        let owner = self.config.instance_id().to_string();
        self.bridge(async move {
            store.associate_keys(&owner, keys.clone()).await?;
            // A key taken back before the next checkpoint stays with the store.
            lock(&pending_disassociations).retain(|key| !keys.contains(key));
            lock(&associated).extend(keys);
            Ok::<(), Fault>(())
        })
    }

    fn has_pending_tracking_records(&self) -> bool {
        !lock(&self.pending_records).is_empty()
    }

    fn begin_track_pending_records(&self) -> Completion {
        let records = mem::take(&mut *lock(&self.pending_records));
        let tracking = Arc::clone(&self.tracking);
        self.bridge(async move {
            tracking.track(records).await?;
            Ok::<(), Fault>(())
        })
    }

    fn add_tracking_record(&self, record: TrackingRecord) {
        if self.config.tracking_enabled() {
            lock(&self.pending_records).push(record);
        }
    }

    fn finish_work_item(&self, item: ScheduledItem) {
        if let Err(fatal) = self.try_finish_work_item(item) {
            error::escalate(fatal);
        }
    }

    fn finish_work_item_after_tracking(&self, item: ScheduledItem) {
        if let Err(fatal) = self.try_finish_after_tracking(item) {
            error::escalate(fatal);
        }
    }

    fn enter_no_persist(&self) {
        self.no_persist.fetch_add(1, Ordering::AcqRel);
    }

    /// # Panics
    ///
    /// Panics if no region is open.
    fn exit_no_persist(&self) {
        let previous = self
            .no_persist
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        assert!(
            previous.is_ok(),
            "exit_no_persist called without a matching enter_no_persist"
        );
    }
}
