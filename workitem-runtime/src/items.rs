//! Work-item variants run by [`ActivityExecutor`](crate::ActivityExecutor).
//!
//! [`ExecuteActivityWorkItem`] is the hot-path variant and cycles through the
//! executor's pool. The others are transient.

use std::fmt;
use std::sync::Arc;
use workitem_core::trace::{self, TraceEvent};
use workitem_core::{
    ActivityInstance, ActivityRecordState, Bookmark, BookmarkManager, Executor, FatalError, Fault,
    InstanceKey, Reusable, TrackingRecord, WorkItem, WorkItemState,
};

/// What an activity body reports after one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    /// The activity is done; its work item completes.
    Completed,
    /// The activity waits on a bookmark; its work item is parked until
    /// [`ActivityExecutor::resume_suspended`](crate::ActivityExecutor::resume_suspended).
    Suspended,
}

/// The user-supplied effect of an activity.
///
/// Bodies run on the scheduling thread and must not block. A returned error
/// becomes the fault propagated from the activity, unless it wraps a
/// [`FatalError`], which stops the executor.
pub trait ActivityBody: Send + Sync {
    fn run(&self, context: &mut ActivityContext<'_>) -> anyhow::Result<ActivityStatus>;
}

impl<F> ActivityBody for F
where
    F: Fn(&mut ActivityContext<'_>) -> anyhow::Result<ActivityStatus> + Send + Sync,
{
    fn run(&self, context: &mut ActivityContext<'_>) -> anyhow::Result<ActivityStatus> {
        self(context)
    }
}

/// Wrap a closure as a shareable activity body.
///
/// # Example
///
/// ```rust,ignore
/// let body = activity_fn(|ctx| {
///     ctx.register_key(InstanceKey::new("order:42"));
///     Ok(ActivityStatus::Completed)
/// });
/// executor.schedule_activity(&instance, body);
/// ```
pub fn activity_fn<F>(body: F) -> Arc<dyn ActivityBody>
where
    F: Fn(&mut ActivityContext<'_>) -> anyhow::Result<ActivityStatus> + Send + Sync + 'static,
{
    Arc::new(body)
}

/// The view of the executor an activity body gets while it runs.
pub struct ActivityContext<'a> {
    executor: &'a dyn Executor,
    bookmarks: &'a mut dyn BookmarkManager,
    instance: &'a ActivityInstance,
    resumed: bool,
    in_no_persist: bool,
}

impl<'a> ActivityContext<'a> {
    fn new(
        executor: &'a dyn Executor,
        bookmarks: &'a mut dyn BookmarkManager,
        instance: &'a ActivityInstance,
        resumed: bool,
        in_no_persist: bool,
    ) -> Self {
        Self {
            executor,
            bookmarks,
            instance,
            resumed,
            in_no_persist,
        }
    }

    pub fn instance(&self) -> &ActivityInstance {
        self.instance
    }

    /// Whether the body already ran once and suspended.
    pub fn is_resumption(&self) -> bool {
        self.resumed
    }

    pub fn create_bookmark(&mut self, name: &str) -> Bookmark {
        self.bookmarks.create_bookmark(name, self.instance.id())
    }

    /// Associate `key` with the running instance once this work item completes.
    pub fn register_key(&self, key: InstanceKey) {
        self.executor.bookmark_scope_manager().register_key(key);
    }

    /// Drop `key` from the running instance once this work item completes.
    pub fn unregister_key(&self, key: InstanceKey) {
        self.executor.bookmark_scope_manager().unregister_key(key);
    }

    /// Queue a tracking record for this activity.
    pub fn track(&self, state: ActivityRecordState) {
        self.executor
            .add_tracking_record(TrackingRecord::new(self.instance, state));
    }

    /// Forbid persisting the workflow until this work item is released.
    /// Entering twice from the same work item has no further effect.
    pub fn enter_no_persist(&mut self) {
        if !self.in_no_persist {
            self.executor.enter_no_persist();
            self.in_no_persist = true;
        }
    }
}

/// Runs an activity body for its bound instance.
pub struct ExecuteActivityWorkItem {
    state: WorkItemState,
    body: Option<Arc<dyn ActivityBody>>,
    runs: u32,
    outcome: Option<ActivityRecordState>,
}

impl ExecuteActivityWorkItem {
    pub fn new(instance: Arc<ActivityInstance>) -> Self {
        Self {
            state: WorkItemState::new(instance),
            body: None,
            runs: 0,
            outcome: None,
        }
    }

    pub fn set_body(&mut self, body: Arc<dyn ActivityBody>) {
        self.body = Some(body);
    }

    /// Number of times the body ran on this use of the item.
    pub fn runs(&self) -> u32 {
        self.runs
    }
}

impl WorkItem for ExecuteActivityWorkItem {
    fn state(&self) -> &WorkItemState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut WorkItemState {
        &mut self.state
    }

    fn is_valid(&self) -> bool {
        self.body.is_some()
    }

    fn property_manager_owner(&self) -> Option<&Arc<ActivityInstance>> {
        Some(self.state.activity_instance())
    }

    fn execute(
        &mut self,
        executor: &dyn Executor,
        bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError> {
        let Some(body) = self.body.clone() else {
            return Err(FatalError::StateCorrupted(
                "activity work item executed without a body".to_string(),
            ));
        };
        let instance = Arc::clone(self.state.activity_instance());
        executor.add_tracking_record(TrackingRecord::new(
            &instance,
            ActivityRecordState::Executing,
        ));

        let mut context = ActivityContext::new(
            executor,
            bookmarks,
            &instance,
            self.runs > 0,
            self.state.exit_no_persist_required(),
        );
        let result = body.run(&mut context);
        let entered_no_persist = context.in_no_persist;
        self.runs += 1;

        if entered_no_persist {
            self.state.require_exit_no_persist();
        }

        match result {
            Ok(ActivityStatus::Completed) => {
                self.outcome = Some(ActivityRecordState::Closed);
                Ok(true)
            }
            Ok(ActivityStatus::Suspended) => Ok(false),
            Err(error) => {
                let fault = Fault::from(error).into_fatal()?;
                tracing::debug!(
                    instance_id = %instance.id(),
                    error = %fault,
                    "Activity body faulted"
                );
                self.state.set_exception_to_propagate(fault);
                self.outcome = Some(ActivityRecordState::Faulted);
                Ok(true)
            }
        }
    }

    fn post_process(&mut self, executor: &dyn Executor) {
        if let Some(outcome) = self.outcome.take() {
            executor.add_tracking_record(TrackingRecord::new(
                self.state.activity_instance(),
                outcome,
            ));
        }
    }

    fn trace_starting(&self) {
        trace::work_item_variant(
            TraceEvent::Starting,
            "ExecuteActivity",
            self.state.activity_instance(),
        );
    }

    fn trace_completed(&self) {
        trace::work_item_variant(
            TraceEvent::Completed,
            "ExecuteActivity",
            self.state.activity_instance(),
        );
    }
}

impl Reusable for ExecuteActivityWorkItem {
    fn clear_for_reuse(&mut self) {
        self.body = None;
        self.runs = 0;
        self.outcome = None;
        self.state.clear_for_reuse();
    }
}

/// A placeholder that keeps its instance busy for one scheduling turn.
pub struct EmptyWorkItem {
    state: WorkItemState,
}

impl EmptyWorkItem {
    pub fn new(instance: Arc<ActivityInstance>) -> Self {
        Self {
            state: WorkItemState::empty(instance),
        }
    }
}

impl WorkItem for EmptyWorkItem {
    fn state(&self) -> &WorkItemState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut WorkItemState {
        &mut self.state
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn property_manager_owner(&self) -> Option<&Arc<ActivityInstance>> {
        None
    }

    fn execute(
        &mut self,
        _executor: &dyn Executor,
        _bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError> {
        Ok(true)
    }

    fn post_process(&mut self, _executor: &dyn Executor) {}
}

type Callback = Box<dyn FnOnce(&ActivityInstance) -> anyhow::Result<()> + Send>;

/// Runs a one-off closure against its instance.
pub struct CallbackWorkItem {
    state: WorkItemState,
    callback: Option<Callback>,
}

impl CallbackWorkItem {
    pub fn new<F>(instance: Arc<ActivityInstance>, callback: F) -> Self
    where
        F: FnOnce(&ActivityInstance) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            state: WorkItemState::new(instance),
            callback: Some(Box::new(callback)),
        }
    }
}

impl fmt::Debug for CallbackWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackWorkItem")
            .field("state", &self.state)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

impl WorkItem for CallbackWorkItem {
    fn state(&self) -> &WorkItemState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut WorkItemState {
        &mut self.state
    }

    /// A callback runs at most once.
    fn is_valid(&self) -> bool {
        self.callback.is_some()
    }

    fn property_manager_owner(&self) -> Option<&Arc<ActivityInstance>> {
        Some(self.state.activity_instance())
    }

    fn execute(
        &mut self,
        _executor: &dyn Executor,
        _bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError> {
        let Some(callback) = self.callback.take() else {
            return Ok(true);
        };
        if let Err(error) = callback(self.state.activity_instance()) {
            let fault = Fault::from(error).into_fatal()?;
            self.state.set_exception_to_propagate(fault);
        }
        Ok(true)
    }

    fn post_process(&mut self, _executor: &dyn Executor) {}

    fn trace_starting(&self) {
        trace::work_item_variant(TraceEvent::Starting, "Callback", self.state.activity_instance());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::InMemoryBookmarkManager;
    use crate::scope::ScopeKeyRegistry;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use workitem_core::{
        ActivityDescriptor, ActivityInstanceId, BookmarkScopeManager, Completion, ScheduledItem,
    };

    /// Records what items ask of the executor without scheduling anything.
    #[derive(Default)]
    struct RecordingExecutor {
        scope: ScopeKeyRegistry,
        records: Mutex<Vec<TrackingRecord>>,
        no_persist: AtomicUsize,
    }

    impl RecordingExecutor {
        fn states(&self) -> Vec<ActivityRecordState> {
            self.records.lock().unwrap().iter().map(|r| r.state).collect()
        }
    }

    impl Executor for RecordingExecutor {
        fn bookmark_scope_manager(&self) -> &dyn BookmarkScopeManager {
            &self.scope
        }

        fn disassociate_keys(&self, _keys: Vec<InstanceKey>) -> Result<(), Fault> {
            Ok(())
        }

        fn begin_associate_keys(&self, _keys: Vec<InstanceKey>) -> Completion {
            Completion::ready(Ok(()))
        }

        fn has_pending_tracking_records(&self) -> bool {
            !self.records.lock().unwrap().is_empty()
        }

        fn begin_track_pending_records(&self) -> Completion {
            Completion::ready(Ok(()))
        }

        fn add_tracking_record(&self, record: TrackingRecord) {
            self.records.lock().unwrap().push(record);
        }

        fn finish_work_item(&self, _item: ScheduledItem) {}

        fn finish_work_item_after_tracking(&self, _item: ScheduledItem) {}

        fn enter_no_persist(&self) {
            self.no_persist.fetch_add(1, Ordering::SeqCst);
        }

        fn exit_no_persist(&self) {
            self.no_persist.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn instance(id: u64) -> Arc<ActivityInstance> {
        Arc::new(ActivityInstance::new(
            ActivityInstanceId::new(id),
            ActivityDescriptor::new("Receive", format!("receive {id}")),
        ))
    }

    fn activity(
        instance: &Arc<ActivityInstance>,
        body: Arc<dyn ActivityBody>,
    ) -> ExecuteActivityWorkItem {
        let mut item = ExecuteActivityWorkItem::new(Arc::clone(instance));
        item.set_body(body);
        item
    }

    #[test]
    fn test_completed_body_tracks_executing_then_closed() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let parent = instance(1);
        let mut item = activity(
            &parent,
            activity_fn(|ctx| {
                ctx.register_key(InstanceKey::new("order:7"));
                Ok(ActivityStatus::Completed)
            }),
        );

        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        item.post_process(&executor);

        assert_eq!(
            executor.states(),
            vec![ActivityRecordState::Executing, ActivityRecordState::Closed]
        );
        assert_eq!(
            executor.scope.keys_to_associate(),
            vec![InstanceKey::new("order:7")]
        );
        assert!(item.state().exception_to_propagate().is_none());
    }

    #[test]
    fn test_suspended_body_leaves_bookmark() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let parent = instance(2);
        let mut item = activity(
            &parent,
            activity_fn(|ctx| {
                if ctx.is_resumption() {
                    return Ok(ActivityStatus::Completed);
                }
                ctx.create_bookmark("approval");
                Ok(ActivityStatus::Suspended)
            }),
        );

        assert!(!item.execute(&executor, &mut bookmarks).unwrap());
        item.post_process(&executor);
        assert!(bookmarks.has_bookmarks(parent.id()));
        assert_eq!(executor.states(), vec![ActivityRecordState::Executing]);

        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        assert_eq!(item.runs(), 2);
    }

    #[test]
    fn test_body_error_becomes_propagated_fault() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let mut item = activity(
            &instance(3),
            activity_fn(|_| Err(anyhow::anyhow!("invalid order"))),
        );

        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        item.post_process(&executor);

        assert!(matches!(
            item.state().exception_to_propagate(),
            Some(Fault::Activity(_))
        ));
        assert_eq!(
            executor.states(),
            vec![ActivityRecordState::Executing, ActivityRecordState::Faulted]
        );
    }

    #[test]
    fn test_fatal_body_error_is_returned() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let mut item = activity(
            &instance(4),
            activity_fn(|_| Err(FatalError::ResourceExhausted("threads".into()).into())),
        );

        let result = item.execute(&executor, &mut bookmarks);
        assert!(matches!(result, Err(FatalError::ResourceExhausted(_))));
        assert!(item.state().exception_to_propagate().is_none());
    }

    #[test]
    fn test_no_persist_entered_once_per_item() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let mut item = activity(
            &instance(5),
            activity_fn(|ctx| {
                ctx.enter_no_persist();
                ctx.enter_no_persist();
                Ok(ActivityStatus::Suspended)
            }),
        );

        item.execute(&executor, &mut bookmarks).unwrap();
        item.execute(&executor, &mut bookmarks).unwrap();

        assert_eq!(executor.no_persist.load(Ordering::SeqCst), 1);
        assert!(item.state().exit_no_persist_required());
    }

    #[test]
    fn test_clear_for_reuse_drops_body() {
        let mut item = activity(
            &instance(6),
            activity_fn(|_| Ok(ActivityStatus::Completed)),
        );
        item.runs = 3;

        item.clear_for_reuse();
        assert!(!item.is_valid());
        assert_eq!(item.runs(), 0);
        assert!(!item.state().is_bound());
    }

    #[test]
    fn test_callback_runs_once() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut item = CallbackWorkItem::new(instance(7), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(item.is_valid());
        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        assert!(!item.is_valid());
        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_error_propagates() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let mut item = CallbackWorkItem::new(instance(8), |_| anyhow::bail!("rejected"));

        item.execute(&executor, &mut bookmarks).unwrap();
        assert!(item.state().exception_to_propagate().is_some());
    }

    #[test]
    fn test_empty_item() {
        let executor = RecordingExecutor::default();
        let mut bookmarks = InMemoryBookmarkManager::new();
        let parent = instance(9);
        let mut item = EmptyWorkItem::new(Arc::clone(&parent));

        assert!(item.state().is_empty());
        assert!(item.property_manager_owner().is_none());
        assert!(item.execute(&executor, &mut bookmarks).unwrap());
        assert_eq!(parent.busy_count(), 1);
    }
}
