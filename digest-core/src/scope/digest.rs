//! Digest Loop
//!
//! The digest re-evaluates every watcher until a full iteration observes no
//! change, fires listeners for the changes it does observe, and drains the
//! in-cycle queue between passes.
//!
//! # Algorithm
//!
//! 1. Enter the digesting phase and forget the last dirty watcher.
//! 2. Cancel any host digest requested by `eval_async`. If an `apply_async`
//!    flush is pending, cancel it and run its queue now.
//! 3. Iterate:
//!    a. Run one pass over the watchers in registration order. A pass stops
//!       early at the watcher that was the last to change, because everything
//!       after it was already clean.
//!    b. Drain the in-cycle queue completely.
//!    c. Stop once neither the pass nor the drain did anything.
//!    d. Fail with [`ScopeError::TtlExceeded`] after `ttl` dirty iterations.
//! 4. Leave the phase and run the post-digest queue once.
//!
//! There is no dependency tracking: every watcher is evaluated on every pass
//! until the early exit kicks in.

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::fault::{self, FaultKind};
use super::{Phase, Scope};
use crate::error::{Result, ScopeError};

/// Counters describing one converged digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestSummary {
    /// Iterations of the loop, including the final clean one.
    pub passes: usize,
    /// Watch function invocations.
    pub evaluations: usize,
    /// Listener invocations.
    pub listener_calls: usize,
    /// In-cycle tasks run.
    pub async_tasks: usize,
    /// Out-of-cycle tasks flushed at the start of the digest.
    pub apply_async_tasks: usize,
    /// Post-digest callbacks run after convergence.
    pub post_digest_tasks: usize,
}

impl Scope {
    /// Run watchers until their values settle.
    ///
    /// Returns [`ScopeError::TtlExceeded`] when the watchers keep changing
    /// each other for more than the configured number of iterations, and
    /// [`ScopeError::PhaseConflict`] when called from inside another phase.
    pub fn digest(&self) -> Result<DigestSummary> {
        let mut summary = DigestSummary::default();
        {
            let _phase = self.inner.phase.enter(Phase::Digesting)?;
            self.inner.last_dirty.set(None);

            // Everything queued by eval_async is drained below.
            if let Some(task) = self.inner.async_digest_task.take() {
                self.inner.scheduler.cancel(task);
            }
            if let Some(task) = self.inner.apply_async_task.get() {
                self.inner.scheduler.cancel(task);
                summary.apply_async_tasks = self.flush_apply_async();
            }

            let ttl = self.inner.config.ttl;
            loop {
                summary.passes += 1;
                let changed = self.digest_once(&mut summary);
                let drained = self.drain_async_queue();
                summary.async_tasks += drained;

                if !changed && drained == 0 {
                    break;
                }
                if summary.passes >= ttl {
                    warn!(ttl, "digest did not converge");
                    return Err(ScopeError::TtlExceeded { ttl });
                }
            }
        }

        summary.post_digest_tasks = self.inner.post_digest_queue.drain(|task| {
            if let Err(fault) = fault::isolate(FaultKind::PostDigest, task) {
                self.report_fault(&fault);
            }
        });

        debug!(
            passes = summary.passes,
            evaluations = summary.evaluations,
            listener_calls = summary.listener_calls,
            async_tasks = summary.async_tasks,
            "digest converged"
        );
        Ok(summary)
    }

    /// One pass over the watchers. Returns `true` if any listener fired.
    fn digest_once(&self, summary: &mut DigestSummary) -> bool {
        let mut dirty = false;

        for watcher in self.inner.watchers.snapshot() {
            if watcher.is_removed() {
                continue;
            }

            summary.evaluations += 1;
            let value = match fault::isolate(FaultKind::Watch, || watcher.evaluate(self)) {
                Ok(value) => value,
                Err(fault) => {
                    self.report_fault(&fault);
                    continue;
                }
            };

            match watcher.check(value) {
                Some(change) => {
                    trace!(watcher = %watcher.id(), new = ?change.new, old = ?change.old, "watcher dirty");
                    self.inner.last_dirty.set(Some(watcher.id()));
                    summary.listener_calls += 1;
                    dirty = true;
                    if let Err(fault) =
                        fault::isolate(FaultKind::Listener, || watcher.notify(&change, self))
                    {
                        self.report_fault(&fault);
                    }
                }
                None if self.inner.last_dirty.get() == Some(watcher.id()) => break,
                None => {}
            }
        }

        dirty
    }

    fn drain_async_queue(&self) -> usize {
        self.inner.async_queue.drain(|task| {
            if let Err(fault) = fault::isolate(FaultKind::EvalAsync, || task(self)) {
                self.report_fault(&fault);
            }
        })
    }

    /// Run every queued `apply_async` task and forget the pending flush.
    pub(crate) fn flush_apply_async(&self) -> usize {
        let ran = self.inner.apply_async_queue.drain(|task| {
            if let Err(fault) = fault::isolate(FaultKind::ApplyAsync, || task(self)) {
                self.report_fault(&fault);
            }
        });
        self.inner.apply_async_task.set(None);
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn bump(scope: &Scope, field: &str) {
        let next = scope.get(field).as_i64().unwrap_or(0) + 1;
        scope.set(field, next);
    }

    #[test]
    fn stable_scope_converges_in_one_pass() {
        let scope = Scope::new();
        scope.set("a", 1);
        scope.observe(|scope| scope.get("a"));

        let first = scope.digest().unwrap();
        assert_eq!(first.passes, 2);
        assert_eq!(first.listener_calls, 1);

        let second = scope.digest().unwrap();
        assert_eq!(second.passes, 1);
        assert_eq!(second.listener_calls, 0);
    }

    #[test]
    fn early_exit_reproduces_evaluation_counts() {
        let scope = Scope::new();
        scope.set("array", Value::list(0..100));

        for i in 0..100 {
            scope.observe(move |scope| {
                let value = scope.get("array").as_list().and_then(|l| l.get(i));
                value.unwrap_or_default()
            });
        }

        assert_eq!(scope.digest().unwrap().evaluations, 200);

        scope.get("array").as_list().unwrap().set(0, 420);
        assert_eq!(scope.digest().unwrap().evaluations, 101);
    }

    #[test]
    fn ttl_bound_is_configurable() {
        let scope = Scope::builder().ttl(3).build().unwrap();
        scope.watch(|scope| scope.get("a"), |_, _, scope| bump(scope, "b"));
        scope.watch(|scope| scope.get("b"), |_, _, scope| bump(scope, "a"));

        let err = scope.digest().unwrap_err();
        assert!(matches!(err, ScopeError::TtlExceeded { ttl: 3 }));
        assert_eq!(err.to_string(), "3 digest iterations reached");
        assert_eq!(scope.phase(), Phase::None);
    }

    #[test]
    fn failed_digest_skips_post_digest_queue() {
        let scope = Scope::new();
        scope.watch(|scope| scope.get("a"), |_, _, scope| bump(scope, "b"));
        scope.watch(|scope| scope.get("b"), |_, _, scope| bump(scope, "a"));
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let ran_clone = ran.clone();
        scope.post_digest(move || ran_clone.set(true));

        assert!(scope.digest().is_err());
        assert!(!ran.get());
    }

    #[test]
    fn nested_digest_from_listener_is_rejected() {
        let scope = Scope::new();
        scope.watch(
            |scope| scope.get("a"),
            |_, _, scope| {
                let nested = scope.digest();
                scope.set("nested_rejected", matches!(nested, Err(ScopeError::PhaseConflict { .. })));
            },
        );

        scope.digest().unwrap();
        assert_eq!(scope.get("nested_rejected").as_bool(), Some(true));
    }

    #[test]
    fn summary_counts_queued_work() {
        let scope = Scope::new();
        scope.eval_async(|_| {});
        scope.eval_async(|_| {});
        scope.post_digest(|| {});

        let summary = scope.digest().unwrap();
        assert_eq!(summary.async_tasks, 2);
        assert_eq!(summary.post_digest_tasks, 1);
        assert_eq!(summary.passes, 2);
    }
}
