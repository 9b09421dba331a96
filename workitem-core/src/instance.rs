//! Activity instances: the live participants work items are bound to.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A unique identifier for an activity instance within one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityInstanceId(u64);

impl ActivityInstanceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::ops::Deref for ActivityInstanceId {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ActivityInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity metadata of the activity an instance runs. Used only for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDescriptor {
    pub type_name: String,
    pub display_name: String,
}

impl ActivityDescriptor {
    pub fn new(type_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            display_name: display_name.into(),
        }
    }
}

/// A live participant in the execution tree.
///
/// The busy count records how many work items currently reference the
/// instance. Work items increment it when they bind and decrement it when
/// they are released; nothing else touches it.
#[derive(Debug)]
pub struct ActivityInstance {
    id: ActivityInstanceId,
    activity: ActivityDescriptor,
    busy_count: AtomicUsize,
}

impl ActivityInstance {
    pub fn new(id: ActivityInstanceId, activity: ActivityDescriptor) -> Self {
        Self {
            id,
            activity,
            busy_count: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> ActivityInstanceId {
        self.id
    }

    pub fn activity(&self) -> &ActivityDescriptor {
        &self.activity
    }

    /// Number of outstanding work items referencing this instance.
    pub fn busy_count(&self) -> usize {
        self.busy_count.load(Ordering::Acquire)
    }

    /// An instance may only complete once no work item references it.
    pub fn is_completion_eligible(&self) -> bool {
        self.busy_count() == 0
    }

    pub(crate) fn increment_busy_count(&self) {
        self.busy_count.fetch_add(1, Ordering::AcqRel);
    }

    /// # Panics
    ///
    /// Panics if the count is already zero: some work item was released twice
    /// or never bound.
    pub(crate) fn decrement_busy_count(&self) {
        let previous = self
            .busy_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        assert!(
            previous.is_ok(),
            "busy count underflow on activity instance {}",
            self.id
        );
    }
}
