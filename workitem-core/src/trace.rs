//! Trace channels for work-item lifecycle events.
//!
//! Each channel is a `tracing` target. An event is built only when the
//! installed subscriber enables its target, and emitting never feeds back into
//! execution.

use crate::instance::ActivityInstance;
use tracing::Level;

/// Lifecycle point being traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Scheduled,
    Starting,
    Completed,
}

pub fn runtime_work_item_scheduled(instance: &ActivityInstance) {
    if tracing::enabled!(target: "workitem::scheduled", Level::DEBUG) {
        tracing::debug!(
            target: "workitem::scheduled",
            activity_type = %instance.activity().type_name,
            display_name = %instance.activity().display_name,
            instance_id = %instance.id(),
            "Runtime work item scheduled"
        );
    }
}

pub fn runtime_work_item_starting(instance: &ActivityInstance) {
    if tracing::enabled!(target: "workitem::starting", Level::DEBUG) {
        tracing::debug!(
            target: "workitem::starting",
            activity_type = %instance.activity().type_name,
            display_name = %instance.activity().display_name,
            instance_id = %instance.id(),
            "Runtime work item starting"
        );
    }
}

pub fn runtime_work_item_completed(instance: &ActivityInstance) {
    if tracing::enabled!(target: "workitem::completed", Level::DEBUG) {
        tracing::debug!(
            target: "workitem::completed",
            activity_type = %instance.activity().type_name,
            display_name = %instance.activity().display_name,
            instance_id = %instance.id(),
            "Runtime work item completed"
        );
    }
}

/// Generic hook for variants that have no dedicated channel.
pub fn runtime_work_item(event: TraceEvent, instance: &ActivityInstance) {
    match event {
        TraceEvent::Scheduled => runtime_work_item_scheduled(instance),
        TraceEvent::Starting => runtime_work_item_starting(instance),
        TraceEvent::Completed => runtime_work_item_completed(instance),
    }
}

/// Hook for variants with their own event name, on the `workitem::variant` channel.
pub fn work_item_variant(event: TraceEvent, kind: &'static str, instance: &ActivityInstance) {
    if tracing::enabled!(target: "workitem::variant", Level::TRACE) {
        tracing::trace!(
            target: "workitem::variant",
            kind,
            event = ?event,
            activity_type = %instance.activity().type_name,
            display_name = %instance.activity().display_name,
            instance_id = %instance.id(),
            "Work item lifecycle event"
        );
    }
}
