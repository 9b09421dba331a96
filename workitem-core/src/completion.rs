//! One-shot deferred completion.
//!
//! A [`Completion`] is handed out by an executor when it starts an operation
//! that may finish later. It is either already resolved, or resolved later by
//! its [`CompletionSource`] from any thread. The consumer calls
//! [`Completion::settle`] exactly once: a resolved completion hands the result
//! straight back, a pending one stores the callback and the source invokes it
//! on the resolving thread.

use crate::error::Fault;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

pub type CompletionResult = Result<(), Fault>;

type Continuation = Box<dyn FnOnce(CompletionResult) + Send>;

enum Slot {
    Pending,
    Registered(Continuation),
    Resolved(CompletionResult),
    Done,
}

/// Consumer half of a deferred operation.
#[must_use = "a completion must be settled to observe its result"]
pub struct Completion {
    slot: Arc<Mutex<Slot>>,
}

/// Producer half of a deferred operation.
///
/// Dropping a source without resolving it resolves the completion with
/// [`Fault::Abandoned`], so a waiting continuation always runs.
pub struct CompletionSource {
    slot: Arc<Mutex<Slot>>,
    resolved: bool,
}

/// How a completion settled.
pub enum Settled<T> {
    /// The operation had already finished; the callback was not registered.
    Synchronous(T, CompletionResult),
    /// The callback now owns the state and will run exactly once.
    Deferred,
}

impl Completion {
    /// A completion whose operation finished during the call that created it.
    pub fn ready(result: CompletionResult) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Resolved(result))),
        }
    }

    /// A completion to be resolved later through the returned source.
    pub fn deferred() -> (CompletionSource, Completion) {
        let slot = Arc::new(Mutex::new(Slot::Pending));
        let source = CompletionSource {
            slot: Arc::clone(&slot),
            resolved: false,
        };
        (source, Completion { slot })
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner),
            Slot::Resolved(_)
        )
    }

    /// Observe the result, inline if it is already known, otherwise by
    /// registering `callback` with `state`.
    ///
    /// Resolution and registration are serialized on the same lock, so exactly
    /// one of the two paths is taken.
    pub fn settle<T>(self, state: T, callback: fn(T, CompletionResult)) -> Settled<T>
    where
        T: Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match mem::replace(&mut *slot, Slot::Done) {
            Slot::Resolved(result) => Settled::Synchronous(state, result),
            Slot::Pending => {
                *slot = Slot::Registered(Box::new(move |result| callback(state, result)));
                Settled::Deferred
            }
            Slot::Registered(_) | Slot::Done => unreachable!("completion settled twice"),
        }
    }
}

impl CompletionSource {
    /// Resolve the operation. Runs the registered continuation, if any, on the
    /// calling thread after the lock is released.
    pub fn resolve(mut self, result: CompletionResult) {
        self.complete(result);
    }

    fn complete(&mut self, result: CompletionResult) {
        if self.resolved {
            return;
        }
        self.resolved = true;

        let continuation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match mem::replace(&mut *slot, Slot::Done) {
                Slot::Registered(continuation) => continuation,
                Slot::Pending => {
                    *slot = Slot::Resolved(result);
                    return;
                }
                Slot::Resolved(_) | Slot::Done => return,
            }
        };
        continuation(result);
    }
}

impl Drop for CompletionSource {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!("Deferred operation dropped without resolving");
            self.complete(Err(Fault::Abandoned));
        }
    }
}
