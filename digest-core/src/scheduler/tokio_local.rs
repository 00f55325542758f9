//! A scheduler backed by `tokio` local tasks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use super::{Scheduler, Task, TaskId};

/// Runs each task with [`tokio::task::spawn_local`] on a later turn.
///
/// Without a delay the task yields once before running, which is enough to
/// let the code that scheduled it finish. With a delay it sleeps first.
///
/// # Panics
///
/// [`Scheduler::schedule`] panics if called outside a `tokio::task::LocalSet`.
#[derive(Default)]
pub struct TokioScheduler {
    delay: Option<Duration>,
    in_flight: Rc<RefCell<HashMap<TaskId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `delay` before running each task.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            in_flight: Rc::default(),
        }
    }

    /// Number of tasks spawned but not yet started.
    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) -> TaskId {
        let id = TaskId::new();
        let delay = self.delay;
        let in_flight = Rc::clone(&self.in_flight);

        // spawn_local never polls before returning, so the handle is recorded
        // before the task can remove it.
        let handle = tokio::task::spawn_local(async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            in_flight.borrow_mut().remove(&id);
            trace!(task = %id, "running scheduled task");
            task();
        });

        self.in_flight.borrow_mut().insert(id, handle);
        id
    }

    fn cancel(&self, id: TaskId) -> bool {
        let handle = self.in_flight.borrow_mut().remove(&id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn runs_task_on_a_later_turn() {
        LocalSet::new()
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let ran = Rc::new(Cell::new(false));
                let ran_clone = ran.clone();

                scheduler.schedule(Box::new(move || ran_clone.set(true)));
                assert!(!ran.get());
                assert_eq!(scheduler.in_flight(), 1);

                tokio::time::sleep(Duration::from_millis(10)).await;
                assert!(ran.get());
                assert_eq!(scheduler.in_flight(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn cancel_aborts_pending_task() {
        LocalSet::new()
            .run_until(async {
                let scheduler = TokioScheduler::with_delay(Duration::from_millis(5));
                let ran = Rc::new(Cell::new(false));
                let ran_clone = ran.clone();

                let id = scheduler.schedule(Box::new(move || ran_clone.set(true)));
                assert!(scheduler.cancel(id));

                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(!ran.get());
                assert!(!scheduler.cancel(id));
            })
            .await;
    }
}
