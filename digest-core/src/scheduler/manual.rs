//! A scheduler driven by hand.

use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::trace;

use super::{Scheduler, Task, TaskId};

/// Pending tasks kept in FIFO order until the embedder runs them.
///
/// One call to [`run_pending`](ManualScheduler::run_pending) models one turn
/// of a host event loop: tasks scheduled while that turn runs wait for the
/// next turn.
#[derive(Default)]
pub struct ManualScheduler {
    pending: RefCell<VecDeque<(TaskId, Task)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Run the oldest pending task. Returns `false` if there was none.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running: the task may schedule more work.
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some((id, task)) => {
                trace!(task = %id, "running scheduled task");
                task();
                true
            }
            None => false,
        }
    }

    /// Run the tasks that were pending when this call started.
    pub fn run_pending(&self) -> usize {
        let turn = self.pending();
        let mut ran = 0;
        while ran < turn && self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Run tasks until none are left, including ones scheduled along the way.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) -> TaskId {
        let id = TaskId::new();
        self.pending.borrow_mut().push_back((id, task));
        id
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut pending = self.pending.borrow_mut();
        match pending.iter().position(|(pending_id, _)| *pending_id == id) {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
