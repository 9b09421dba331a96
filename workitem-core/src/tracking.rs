use crate::instance::{ActivityDescriptor, ActivityInstance, ActivityInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state reported by a tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityRecordState {
    Executing,
    Closed,
    Faulted,
}

/// A telemetry record queued by the executor and delivered to the tracking
/// sink when a work item flushes tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub instance_id: ActivityInstanceId,
    pub activity: ActivityDescriptor,
    pub state: ActivityRecordState,
    pub recorded_at: DateTime<Utc>,
}

impl TrackingRecord {
    pub fn new(instance: &ActivityInstance, state: ActivityRecordState) -> Self {
        Self {
            instance_id: instance.id(),
            activity: instance.activity().clone(),
            state,
            recorded_at: Utc::now(),
        }
    }
}
