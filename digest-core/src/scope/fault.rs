//! Callback Faults
//!
//! A panic in a watch function, listener or queued task is caught at the
//! callback boundary and turned into a [`CallbackFault`]. The digest carries
//! on with the next callback; the fault goes to the scope's fault handler.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::error;

/// Which kind of callback faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Watch,
    Listener,
    EvalAsync,
    ApplyAsync,
    PostDigest,
    Apply,
    /// A digest started by the host scheduler failed. There is no caller to
    /// return the error to.
    ScheduledDigest,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Watch => "watch",
            FaultKind::Listener => "listener",
            FaultKind::EvalAsync => "eval_async",
            FaultKind::ApplyAsync => "apply_async",
            FaultKind::PostDigest => "post_digest",
            FaultKind::Apply => "apply",
            FaultKind::ScheduledDigest => "scheduled digest",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} callback failed: {message}")]
pub struct CallbackFault {
    pub kind: FaultKind,
    pub message: String,
}

impl CallbackFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_panic(kind: FaultKind, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(kind, message)
    }
}

/// Receives every isolated fault of a scope.
pub type FaultHandler = Rc<dyn Fn(&CallbackFault)>;

/// The handler installed when none is configured.
pub fn log_fault(fault: &CallbackFault) {
    error!(kind = %fault.kind, message = %fault.message, "callback fault isolated");
}

/// Run `f`, converting a panic into a [`CallbackFault`].
pub(crate) fn isolate<R>(kind: FaultKind, f: impl FnOnce() -> R) -> Result<R, CallbackFault> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| CallbackFault::from_panic(kind, payload))
}
