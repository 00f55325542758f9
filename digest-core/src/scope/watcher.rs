//! Watchers and the Watcher Registry
//!
//! A [`Watcher`] pairs a watch function, which reads something from the
//! scope, with a listener that reacts when the read value changes. The
//! watcher remembers the last value it saw so the digest loop can tell
//! whether it changed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::Scope;
use crate::value::{are_equal, Comparison, Value};

/// Unique identifier for a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

type WatchFn = Box<dyn Fn(&Scope) -> Value>;
type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope)>;

/// An observation over a scope.
///
/// ```rust,ignore
/// let watcher = Watcher::new(|scope| scope.get("items"))
///     .listener(|new, _old, scope| {
///         scope.set("count", new.as_list().map_or(0, |l| l.len()));
///     })
///     .comparison(Comparison::Value);
/// scope.register(watcher);
/// ```
pub struct Watcher {
    id: WatcherId,
    watch_fn: WatchFn,
    listener: ListenerFn,
    comparison: Comparison,
    /// `None` until the first evaluation.
    last: RefCell<Option<Value>>,
    removed: Cell<bool>,
}

/// A detected change: the value to report as new and the one to report as old.
pub(crate) struct Change {
    pub(crate) new: Value,
    pub(crate) old: Value,
}

impl Watcher {
    /// Create a watcher with a no-op listener and reference comparison.
    pub fn new<W>(watch_fn: W) -> Self
    where
        W: Fn(&Scope) -> Value + 'static,
    {
        Self {
            id: WatcherId::next(),
            watch_fn: Box::new(watch_fn),
            listener: Box::new(|_, _, _| {}),
            comparison: Comparison::Reference,
            last: RefCell::new(None),
            removed: Cell::new(false),
        }
    }

    /// Set the function called with `(new, old, scope)` when the value changes.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.listener = Box::new(listener);
        self
    }

    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    pub(crate) fn evaluate(&self, scope: &Scope) -> Value {
        (self.watch_fn)(scope)
    }

    pub(crate) fn notify(&self, change: &Change, scope: &Scope) {
        (self.listener)(&change.new, &change.old, scope)
    }

    /// Compare `value` with the last seen value and record it if it changed.
    ///
    /// On the first evaluation the new value is also reported as the old one.
    pub(crate) fn check(&self, value: Value) -> Option<Change> {
        let mut last = self.last.borrow_mut();
        if let Some(previous) = last.as_ref() {
            if are_equal(previous, &value, self.comparison) {
                return None;
            }
        }

        let stored = match self.comparison {
            Comparison::Value => value.deep_clone(),
            Comparison::Reference => value.clone(),
        };
        let old = last.replace(stored).unwrap_or_else(|| value.clone());
        Some(Change { new: value, old })
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.get()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("comparison", &self.comparison)
            .field("last", &self.last.try_borrow().ok())
            .finish()
    }
}

/// Snapshot of the registry taken at the start of a pass.
pub(crate) type WatcherSnapshot = SmallVec<[Rc<Watcher>; 16]>;

/// Ordered list of a scope's watchers.
#[derive(Debug, Default)]
pub(crate) struct WatcherRegistry {
    watchers: RefCell<Vec<Rc<Watcher>>>,
}

impl WatcherRegistry {
    pub(crate) fn add(&self, watcher: Watcher) -> WatcherId {
        let id = watcher.id;
        self.watchers.borrow_mut().push(Rc::new(watcher));
        id
    }

    /// Remove by identity. A pass already holding a snapshot skips the watcher.
    pub(crate) fn remove(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.borrow_mut();
        match watchers.iter().position(|w| w.id == id) {
            Some(index) => {
                watchers.remove(index).removed.set(true);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> WatcherSnapshot {
        self.watchers.borrow().iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.borrow().len()
    }
}
