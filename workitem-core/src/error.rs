//! Fault taxonomy for the work-item layer.
//!
//! Faults fall into two classes. A [`FatalError`] means the host runtime can no
//! longer be trusted and is never captured by a work item. Every other
//! [`Fault`] is recoverable at the workflow level: during a flush it is
//! captured as the work item's abort fault, during execution it is captured
//! as the fault to propagate.

/// A process-threatening condition. Recovery is unsafe.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// Memory, handles or another host resource ran out.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Runtime bookkeeping is in a state it can never legally reach.
    #[error("Runtime state corrupted: {0}")]
    StateCorrupted(String),
}

/// Any fault raised by a collaborator or an activity body.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// Escalates to the host; never captured.
    #[error(transparent)]
    Fatal(#[from] FatalError),
    /// The durable instance store rejected an operation.
    #[error("Instance store error: {0}")]
    Store(String),
    /// The tracking sink failed to accept records.
    #[error("Tracking error: {0}")]
    Tracking(String),
    /// An activity body failed.
    #[error("Activity fault: {0}")]
    Activity(#[source] anyhow::Error),
    /// The producer of a deferred operation went away without resolving it.
    #[error("Deferred operation abandoned before completion")]
    Abandoned,
}

impl Fault {
    /// Whether this fault must terminate the host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Fatal(_))
    }

    /// Split a fault into its class: `Err` for fatal, `Ok` for capturable.
    pub fn into_fatal(self) -> Result<Fault, FatalError> {
        match self {
            Fault::Fatal(fatal) => Err(fatal),
            other => Ok(other),
        }
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<FatalError>() {
            Ok(fatal) => Fault::Fatal(fatal),
            Err(error) => Fault::Activity(error),
        }
    }
}

/// Terminate the current thread of control with a fatal fault.
///
/// Used where no caller exists to hand the error back to, such as a
/// continuation running on the thread that resolved a deferred operation.
/// Hosts that must terminate the process build with `panic = "abort"`.
pub fn escalate(fatal: FatalError) -> ! {
    tracing::error!(error = %fatal, "Fatal fault escalated to host");
    panic!("fatal fault: {fatal}");
}
