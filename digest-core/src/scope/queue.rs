//! Deferred Queues
//!
//! FIFO queues of callbacks owned by a scope. The queue never holds a borrow
//! while a callback runs, so callbacks may enqueue more work on the same
//! queue.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::Scope;

/// Work for the in-cycle and out-of-cycle queues.
pub(crate) type ScopeTask = Box<dyn FnOnce(&Scope)>;

/// Work for the post-digest queue.
pub(crate) type PostDigestTask = Box<dyn FnOnce()>;

pub(crate) struct TaskQueue<T> {
    tasks: RefCell<VecDeque<T>>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            tasks: RefCell::new(VecDeque::new()),
        }
    }
}

impl<T> TaskQueue<T> {
    /// Append a task. Returns `true` if the queue was empty before.
    pub(crate) fn push(&self, task: T) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let was_empty = tasks.is_empty();
        tasks.push_back(task);
        was_empty
    }

    pub(crate) fn pop(&self) -> Option<T> {
        self.tasks.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Pop and run tasks until the queue is empty, including tasks pushed by
    /// the tasks themselves. Returns how many ran.
    pub(crate) fn drain(&self, mut run: impl FnMut(T)) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            run(task);
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn push_reports_whether_queue_was_empty() {
        let queue = TaskQueue::default();
        assert!(queue.push(1));
        assert!(!queue.push(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_includes_tasks_added_while_draining() {
        let queue: Rc<TaskQueue<u32>> = Rc::new(TaskQueue::default());
        queue.push(3);

        let mut seen = Vec::new();
        let inner = queue.clone();
        let ran = queue.drain(|n| {
            seen.push(n);
            if n > 1 {
                inner.push(n - 1);
            }
        });

        assert_eq!(ran, 3);
        assert_eq!(seen, vec![3, 2, 1]);
        assert!(queue.is_empty());
    }
}
