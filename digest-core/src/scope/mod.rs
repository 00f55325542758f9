//! Scopes
//!
//! A [`Scope`] holds schema-less application state (named [`Value`] fields)
//! together with the watchers observing it and the queues feeding its digest
//! loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use digest_core::{Scope, Value};
//!
//! let scope = Scope::new();
//! scope.set("name", "Jane");
//!
//! scope.watch(
//!     |scope| scope.get("name"),
//!     |new, _old, scope| {
//!         let upper = new.as_str().map(str::to_uppercase);
//!         scope.set("upper", upper);
//!     },
//! );
//!
//! scope.apply(|scope| scope.set("name", "Bob"))?;
//! assert_eq!(scope.get("upper").as_str(), Some("BOB"));
//! ```
//!
//! # Re-entrancy
//!
//! `Scope` is a cheap handle around shared single-threaded state. Every
//! callback receives the scope and may read and write fields, register
//! watchers, or queue work. No internal borrow is held while user code runs.
//! Starting a second digest or apply from inside one is rejected with
//! [`ScopeError::PhaseConflict`](crate::ScopeError::PhaseConflict).
//!
//! # Deferred work
//!
//! - [`eval_async`](Scope::eval_async) queues work for the current or next
//!   digest and, when the scope is idle, asks the host scheduler to start one.
//! - [`apply_async`](Scope::apply_async) queues work that runs in its own
//!   apply on a later turn. Calls made before that turn share one flush, and
//!   a digest that runs first absorbs the queue and cancels the flush.
//! - [`post_digest`](Scope::post_digest) runs once after the next converged
//!   digest.

mod digest;
mod fault;
mod phase;
mod queue;
mod watcher;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

pub use digest::DigestSummary;
pub use fault::{log_fault, CallbackFault, FaultHandler, FaultKind};
pub use phase::Phase;
pub use watcher::{Watcher, WatcherId};

use phase::PhaseTracker;
use queue::{PostDigestTask, ScopeTask, TaskQueue};
use watcher::WatcherRegistry;

use crate::config::ScopeConfig;
use crate::error::Result;
use crate::scheduler::{ManualScheduler, Scheduler, TaskId};
use crate::value::{Comparison, Value};

struct ScopeInner {
    config: ScopeConfig,
    fields: RefCell<IndexMap<String, Value>>,
    watchers: WatcherRegistry,
    /// Last watcher seen changing in the current digest.
    last_dirty: Cell<Option<WatcherId>>,
    phase: PhaseTracker,
    async_queue: TaskQueue<ScopeTask>,
    apply_async_queue: TaskQueue<ScopeTask>,
    /// Pending flush of `apply_async_queue`, if one is scheduled.
    apply_async_task: Cell<Option<TaskId>>,
    /// Host digest requested by `eval_async`, if one is scheduled.
    async_digest_task: Cell<Option<TaskId>>,
    post_digest_queue: TaskQueue<PostDigestTask>,
    scheduler: Rc<dyn Scheduler>,
    fault_handler: RefCell<FaultHandler>,
}

/// Handle to a scope. Clones share the same state.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a scope with default configuration and a [`ManualScheduler`]
    /// that nothing drives. Deferred work then runs only when `digest` or
    /// `apply` is called directly; use [`Scope::with_scheduler`] to let the
    /// host run it.
    pub fn new() -> Self {
        Self::from_parts(
            ScopeConfig::default(),
            Rc::new(ManualScheduler::new()),
            Rc::new(log_fault),
        )
    }

    /// Create a scope whose deferred work is run by `scheduler`.
    pub fn with_scheduler(scheduler: Rc<dyn Scheduler>) -> Self {
        Self::from_parts(ScopeConfig::default(), scheduler, Rc::new(log_fault))
    }

    /// Start configuring a scope with a custom config, scheduler or fault
    /// handler.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    fn from_parts(config: ScopeConfig, scheduler: Rc<dyn Scheduler>, handler: FaultHandler) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                config,
                fields: RefCell::new(IndexMap::new()),
                watchers: WatcherRegistry::default(),
                last_dirty: Cell::new(None),
                phase: PhaseTracker::default(),
                async_queue: TaskQueue::default(),
                apply_async_queue: TaskQueue::default(),
                apply_async_task: Cell::new(None),
                async_digest_task: Cell::new(None),
                post_digest_queue: TaskQueue::default(),
                scheduler,
                fault_handler: RefCell::new(handler),
            }),
        }
    }

    fn upgrade(weak: &Weak<ScopeInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Read a field. Missing fields read as [`Value::Undefined`].
    pub fn get(&self, name: &str) -> Value {
        self.inner.fields.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Write a field, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.fields.borrow_mut().insert(name.into(), value.into())
    }

    /// Replace a field with a value computed from its current one.
    pub fn update(&self, name: &str, f: impl FnOnce(&Value) -> Value) {
        let next = f(&self.get(name));
        self.set(name, next);
    }

    /// Delete a field, returning its value. Later reads yield `Undefined`.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.fields.borrow_mut().shift_remove(name)
    }

    /// Whether the field has been set, even to `Undefined`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.fields.borrow().contains_key(name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Watch a value using reference comparison.
    pub fn watch<W, L>(&self, watch_fn: W, listener: L) -> WatcherId
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.register(Watcher::new(watch_fn).listener(listener))
    }

    /// Watch a value using structural comparison.
    pub fn watch_deep<W, L>(&self, watch_fn: W, listener: L) -> WatcherId
    where
        W: Fn(&Scope) -> Value + 'static,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.register(
            Watcher::new(watch_fn)
                .listener(listener)
                .comparison(Comparison::Value),
        )
    }

    /// Register a watch function without a listener.
    pub fn observe<W>(&self, watch_fn: W) -> WatcherId
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        self.register(Watcher::new(watch_fn))
    }

    pub fn register(&self, watcher: Watcher) -> WatcherId {
        let id = self.inner.watchers.add(watcher);
        // A watcher added mid-digest must not be skipped by the early exit.
        self.inner.last_dirty.set(None);
        trace!(watcher = %id, "watcher registered");
        id
    }

    /// Remove a watcher. Returns `false` if it was not registered.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let removed = self.inner.watchers.remove(id);
        if removed {
            self.inner.last_dirty.set(None);
            trace!(watcher = %id, "watcher removed");
        }
        removed
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    // ------------------------------------------------------------------
    // Eval / apply
    // ------------------------------------------------------------------

    /// Run `f` against this scope. No digest is triggered.
    pub fn eval<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        f(self)
    }

    /// Run `f` against this scope with extra `locals`.
    pub fn eval_with<L, R>(&self, locals: L, f: impl FnOnce(&Scope, L) -> R) -> R {
        f(self, locals)
    }

    /// Run `f` in the applying phase, then digest.
    ///
    /// The digest runs even if `f` panics; the panic is reported to the fault
    /// handler and returned as [`ScopeError::Callback`](crate::ScopeError::Callback).
    pub fn apply<R>(&self, f: impl FnOnce(&Scope) -> R) -> Result<R> {
        let outcome = {
            let _phase = self.inner.phase.enter(Phase::Applying)?;
            fault::isolate(FaultKind::Apply, || self.eval(f))
        };
        if let Err(fault) = &outcome {
            self.report_fault(fault);
        }

        self.digest()?;
        Ok(outcome?)
    }

    /// Queue `task` to run during the current digest, or the next one.
    ///
    /// When the scope is idle, a digest is scheduled with the host so the
    /// task runs even if nobody digests. At most one such digest is pending;
    /// a direct `digest` cancels it.
    pub fn eval_async<F>(&self, task: F)
    where
        F: FnOnce(&Scope) + 'static,
    {
        self.inner.async_queue.push(Box::new(task));
        if self.inner.phase.is_idle() && self.inner.async_digest_task.get().is_none() {
            self.schedule_async_digest();
        }
    }

    /// Queue `task` to run in its own apply on a later turn.
    pub fn apply_async<F>(&self, task: F)
    where
        F: FnOnce(&Scope) + 'static,
    {
        self.inner.apply_async_queue.push(Box::new(task));
        if self.inner.apply_async_task.get().is_some() {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let id = self.inner.scheduler.schedule(Box::new(move || {
            let Some(scope) = Scope::upgrade(&weak) else {
                return;
            };
            if let Err(err) = scope.apply(|scope| scope.flush_apply_async()) {
                scope.report_fault(&CallbackFault::new(
                    FaultKind::ScheduledDigest,
                    err.to_string(),
                ));
            }
        }));
        trace!(task = %id, "scheduled apply_async flush");
        self.inner.apply_async_task.set(Some(id));
    }

    /// Run `task` once, after the next digest converges.
    pub fn post_digest<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.post_digest_queue.push(Box::new(task));
    }

    fn schedule_async_digest(&self) {
        let weak = Rc::downgrade(&self.inner);
        let id = self.inner.scheduler.schedule(Box::new(move || {
            let Some(scope) = Scope::upgrade(&weak) else {
                return;
            };
            scope.inner.async_digest_task.set(None);
            if scope.inner.async_queue.is_empty() {
                return;
            }
            if let Err(err) = scope.digest() {
                scope.report_fault(&CallbackFault::new(
                    FaultKind::ScheduledDigest,
                    err.to_string(),
                ));
            }
        }));
        trace!(task = %id, "scheduled digest for eval_async");
        self.inner.async_digest_task.set(Some(id));
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// The activity the scope is currently in.
    pub fn phase(&self) -> Phase {
        self.inner.phase.current()
    }

    /// Configuration the scope was built with.
    pub fn config(&self) -> &ScopeConfig {
        &self.inner.config
    }

    /// Replace the handler that receives isolated callback faults.
    pub fn set_fault_handler(&self, handler: impl Fn(&CallbackFault) + 'static) {
        *self.inner.fault_handler.borrow_mut() = Rc::new(handler);
    }

    /// Number of tasks waiting in the in-cycle queue.
    pub fn pending_async(&self) -> usize {
        self.inner.async_queue.len()
    }

    /// Whether an `apply_async` flush is scheduled and has not run yet.
    pub fn has_pending_apply_async(&self) -> bool {
        self.inner.apply_async_task.get().is_some()
    }

    fn report_fault(&self, fault: &CallbackFault) {
        // Clone out so the handler may replace itself.
        let handler = Rc::clone(&self.inner.fault_handler.borrow());
        handler(fault);
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("phase", &self.phase())
            .field("fields", &self.inner.fields.try_borrow().map(|fields| fields.len()).ok())
            .field("watchers", &self.watcher_count())
            .field("pending_async", &self.pending_async())
            .field("ttl", &self.inner.config.ttl)
            .finish()
    }
}

/// Configures a [`Scope`] before creating it.
#[derive(Default)]
pub struct ScopeBuilder {
    config: ScopeConfig,
    scheduler: Option<Rc<dyn Scheduler>>,
    fault_handler: Option<FaultHandler>,
}

impl ScopeBuilder {
    /// Use `config` instead of the defaults. Overrides an earlier `ttl`.
    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the digest iteration bound.
    pub fn ttl(mut self, ttl: usize) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Run deferred work on `scheduler` instead of an undriven
    /// [`ManualScheduler`].
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Receive isolated callback faults instead of logging them.
    pub fn fault_handler(mut self, handler: impl Fn(&CallbackFault) + 'static) -> Self {
        self.fault_handler = Some(Rc::new(handler));
        self
    }

    /// Validate the configuration and create the scope.
    pub fn build(self) -> Result<Scope> {
        self.config.validate()?;
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| -> Rc<dyn Scheduler> { Rc::new(ManualScheduler::new()) });
        let handler = self
            .fault_handler
            .unwrap_or_else(|| -> FaultHandler { Rc::new(log_fault) });
        Ok(Scope::from_parts(self.config, scheduler, handler))
    }
}
