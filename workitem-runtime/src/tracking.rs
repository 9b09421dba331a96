//! Tracking sinks that receive the executor's tracking records.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use workitem_core::{Fault, TrackingRecord};

/// Error type for tracking delivery.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// The sink refused the batch.
    #[error("Tracking participant rejected records: {0}")]
    Rejected(String),
    /// Backend-specific error.
    #[error("Tracking backend error: {0}")]
    Backend(String),
}

impl From<TrackingError> for Fault {
    fn from(error: TrackingError) -> Self {
        Fault::Tracking(error.to_string())
    }
}

/// A consumer of tracking records.
///
/// A batch is delivered as a whole. When `track` fails, the executor treats
/// the batch as lost and aborts the workflow.
#[async_trait]
pub trait TrackingParticipant: Send + Sync {
    /// Deliver a batch of records.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError` if the batch cannot be accepted.
    async fn track(&self, records: Vec<TrackingRecord>) -> Result<(), TrackingError>;
}

#[derive(Default)]
struct SinkState {
    records: Vec<TrackingRecord>,
    batches: usize,
    reject_next: Option<String>,
}

/// Collects records in memory. Clones share state.
///
/// With a delay configured, each delivery sleeps before it is accepted, which
/// makes the executor finish its work items through the deferred path.
#[derive(Clone, Default)]
pub struct InMemoryTrackingParticipant {
    state: Arc<Mutex<SinkState>>,
    delay: Option<Duration>,
}

impl InMemoryTrackingParticipant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each delivery by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject the next delivered batch with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state().reject_next = Some(reason.into());
    }

    /// Every record accepted so far, in delivery order.
    pub fn records(&self) -> Vec<TrackingRecord> {
        self.state().records.clone()
    }

    /// Number of accepted batches.
    pub fn batches(&self) -> usize {
        self.state().batches
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TrackingParticipant for InMemoryTrackingParticipant {
    async fn track(&self, records: Vec<TrackingRecord>) -> Result<(), TrackingError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(reason) = state.reject_next.take() {
            return Err(TrackingError::Rejected(reason));
        }
        tracing::trace!(count = records.len(), "Tracking records accepted");
        state.records.extend(records);
        state.batches += 1;
        Ok(())
    }
}
