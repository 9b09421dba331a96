//! Test doubles for the executor contract.

use crate::bookmark::{BookmarkManager, BookmarkScopeManager, InstanceKey};
use crate::completion::{Completion, CompletionResult, CompletionSource};
use crate::error::{FatalError, Fault};
use crate::executor::Executor;
use crate::instance::{ActivityDescriptor, ActivityInstance, ActivityInstanceId};
use crate::pool::Reusable;
use crate::tracking::TrackingRecord;
use crate::work_item::{ScheduledItem, WorkItem, WorkItemState};
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn instance(id: u64) -> Arc<ActivityInstance> {
    Arc::new(ActivityInstance::new(
        ActivityInstanceId::new(id),
        ActivityDescriptor::new("Sequence", format!("activity {id}")),
    ))
}

/// Minimal pool-eligible work item.
pub struct NoopItem {
    state: WorkItemState,
    pub runs: u32,
}

impl NoopItem {
    pub fn new(instance: Arc<ActivityInstance>) -> Self {
        Self {
            state: WorkItemState::new(instance),
            runs: 0,
        }
    }
}

impl WorkItem for NoopItem {
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
        Some(self.state.activity_instance())
    }

    fn execute(
        &mut self,
        _executor: &dyn Executor,
        _bookmarks: &mut dyn BookmarkManager,
    ) -> Result<bool, FatalError> {
        self.runs += 1;
        Ok(true)
    }

    fn post_process(&mut self, _executor: &dyn Executor) {}
}

impl Reusable for NoopItem {
    fn clear_for_reuse(&mut self) {
        self.runs = 0;
        self.state.clear_for_reuse();
    }
}

/// A collaborator call observed by [`MockExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Disassociate(Vec<InstanceKey>),
    BeginAssociate(Vec<InstanceKey>),
    BeginTrack,
    FinishWorkItem,
    FinishWorkItemAfterTracking,
}

/// How a begin call completes.
pub enum Behavior {
    /// Resolved during the call, failing with the fault if one is given.
    Ready(Option<Fault>),
    /// Resolved later through [`MockExecutor::resolve_deferred`].
    Deferred,
}

#[derive(Default)]
struct ScopeKeys {
    disassociate: Vec<InstanceKey>,
    associate: Vec<InstanceKey>,
    forced: bool,
}

#[derive(Default)]
pub struct MockScope {
    keys: Mutex<ScopeKeys>,
}

impl MockScope {
    pub fn mark(&self, disassociate: Vec<InstanceKey>, associate: Vec<InstanceKey>) {
        let mut keys = self.keys.lock().unwrap();
        keys.disassociate = disassociate;
        keys.associate = associate;
    }

    /// Report pending updates even though both key sets are empty.
    pub fn force_update_flag(&self) {
        self.keys.lock().unwrap().forced = true;
    }
}

impl BookmarkScopeManager for MockScope {
    fn has_keys_to_update(&self) -> bool {
        let keys = self.keys.lock().unwrap();
        keys.forced || !keys.disassociate.is_empty() || !keys.associate.is_empty()
    }

    fn keys_to_disassociate(&self) -> Vec<InstanceKey> {
        mem::take(&mut self.keys.lock().unwrap().disassociate)
    }

    fn keys_to_associate(&self) -> Vec<InstanceKey> {
        let mut keys = self.keys.lock().unwrap();
        keys.forced = false;
        mem::take(&mut keys.associate)
    }

    fn register_key(&self, key: InstanceKey) {
        self.keys.lock().unwrap().associate.push(key);
    }

    fn unregister_key(&self, key: InstanceKey) {
        self.keys.lock().unwrap().disassociate.push(key);
    }
}

/// Executor double that records every call and lets tests choose whether
/// begin calls resolve inline or later.
pub struct MockExecutor {
    scope: MockScope,
    calls: Mutex<Vec<Call>>,
    associate: Mutex<Behavior>,
    track: Mutex<Behavior>,
    disassociate_fault: Mutex<Option<Fault>>,
    pending_tracking: AtomicBool,
    deferred: Mutex<Option<CompletionSource>>,
    finished: Mutex<Vec<(Call, ScheduledItem)>>,
    records: Mutex<Vec<TrackingRecord>>,
    exit_no_persist: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            scope: MockScope::default(),
            calls: Mutex::new(Vec::new()),
            associate: Mutex::new(Behavior::Ready(None)),
            track: Mutex::new(Behavior::Ready(None)),
            disassociate_fault: Mutex::new(None),
            pending_tracking: AtomicBool::new(false),
            deferred: Mutex::new(None),
            finished: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
            exit_no_persist: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn scope(&self) -> &MockScope {
        &self.scope
    }

    pub fn set_associate(&self, behavior: Behavior) {
        *self.associate.lock().unwrap() = behavior;
    }

    pub fn set_track(&self, behavior: Behavior) {
        *self.track.lock().unwrap() = behavior;
    }

    pub fn set_disassociate_fault(&self, fault: Fault) {
        *self.disassociate_fault.lock().unwrap() = Some(fault);
    }

    pub fn set_pending_tracking(&self, pending: bool) {
        self.pending_tracking.store(pending, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }

    pub fn take_finished(&self) -> Vec<(Call, ScheduledItem)> {
        mem::take(&mut *self.finished.lock().unwrap())
    }

    pub fn exit_no_persist_calls(&self) -> usize {
        self.exit_no_persist.load(Ordering::SeqCst)
    }

    pub fn take_deferred_source(&self) -> CompletionSource {
        self.deferred
            .lock()
            .unwrap()
            .take()
            .expect("no deferred operation outstanding")
    }

    /// Resolve the outstanding deferred operation on the calling thread.
    pub fn resolve_deferred(&self, result: CompletionResult) {
        let source = self.take_deferred_source();
        source.resolve(result);
    }

    fn begin(&self, behavior: &Mutex<Behavior>) -> Completion {
        let mut behavior = behavior.lock().unwrap();
        match &mut *behavior {
            Behavior::Ready(fault) => match fault.take() {
                Some(fault) => Completion::ready(Err(fault)),
                None => Completion::ready(Ok(())),
            },
            Behavior::Deferred => {
                let (source, completion) = Completion::deferred();
                *self.deferred.lock().unwrap() = Some(source);
                completion
            }
        }
    }
}

impl Executor for MockExecutor {
    fn bookmark_scope_manager(&self) -> &dyn BookmarkScopeManager {
        &self.scope
    }

    fn disassociate_keys(&self, keys: Vec<InstanceKey>) -> Result<(), Fault> {
        self.calls.lock().unwrap().push(Call::Disassociate(keys));
        match self.disassociate_fault.lock().unwrap().take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn begin_associate_keys(&self, keys: Vec<InstanceKey>) -> Completion {
        self.calls.lock().unwrap().push(Call::BeginAssociate(keys));
        self.begin(&self.associate)
    }

    fn has_pending_tracking_records(&self) -> bool {
        self.pending_tracking.load(Ordering::SeqCst)
    }

    fn begin_track_pending_records(&self) -> Completion {
        self.calls.lock().unwrap().push(Call::BeginTrack);
        self.begin(&self.track)
    }

    fn add_tracking_record(&self, record: TrackingRecord) {
        self.records.lock().unwrap().push(record);
        self.pending_tracking.store(true, Ordering::SeqCst);
    }

    fn finish_work_item(&self, item: ScheduledItem) {
        self.finished
            .lock()
            .unwrap()
            .push((Call::FinishWorkItem, item));
    }

    fn finish_work_item_after_tracking(&self, item: ScheduledItem) {
        self.finished
            .lock()
            .unwrap()
            .push((Call::FinishWorkItemAfterTracking, item));
    }

    fn enter_no_persist(&self) {}

    fn exit_no_persist(&self) {
        self.exit_no_persist.fetch_add(1, Ordering::SeqCst);
    }
}
