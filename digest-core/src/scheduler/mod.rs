//! Host Scheduling
//!
//! The digest engine never decides *when* deferred work runs on its own. It
//! hands a [`Task`] to a [`Scheduler`] supplied by the host and keeps the
//! returned [`TaskId`] so it can cancel the task later.
//!
//! Two implementations are provided:
//!
//! - [`ManualScheduler`]: a FIFO of pending tasks driven explicitly by the
//!   embedder. Deterministic, and the default for [`Scope::new`].
//! - [`TokioScheduler`]: runs each task as a `tokio` local task on a later
//!   turn of the runtime. Must be used from inside a `tokio::task::LocalSet`.
//!
//! [`Scope::new`]: crate::Scope::new

mod manual;
mod tokio_local;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use manual::ManualScheduler;
pub use tokio_local::TokioScheduler;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Identifier of a scheduled task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A host facility that runs tasks later, outside the caller's stack frame.
pub trait Scheduler {
    /// Queue `task` to run on a later turn.
    fn schedule(&self, task: Task) -> TaskId;

    /// Cancel a task that has not run yet.
    ///
    /// Returns `false` if the task already ran, was already cancelled, or is
    /// unknown to this scheduler.
    fn cancel(&self, id: TaskId) -> bool;
}
