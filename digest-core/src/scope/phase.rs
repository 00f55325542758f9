//! Phase Tracking
//!
//! A scope is in at most one phase at a time. Code running inside watch
//! functions, listeners and `apply` callbacks can read the phase to learn
//! what the engine is doing.
//!
//! Phases are entered through [`PhaseTracker::enter`], which returns a guard.
//! Dropping the guard clears the phase, so the phase is restored even when a
//! digest fails part way through.

use std::cell::Cell;
use std::fmt;

use crate::error::{Result, ScopeError};

/// What the scope is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Idle.
    #[default]
    None,

    /// Inside the digest loop, including in-cycle queue drains.
    Digesting,

    /// Inside the callback passed to `apply`, before its digest starts.
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::None => "none",
            Phase::Digesting => "digest",
            Phase::Applying => "apply",
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct PhaseTracker {
    current: Cell<Phase>,
}

impl PhaseTracker {
    pub(crate) fn current(&self) -> Phase {
        self.current.get()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.current.get() == Phase::None
    }

    /// Enter `phase`, failing if another phase is active.
    pub(crate) fn enter(&self, phase: Phase) -> Result<PhaseGuard<'_>> {
        let current = self.current.get();
        if current != Phase::None {
            return Err(ScopeError::PhaseConflict {
                current,
                requested: phase,
            });
        }
        self.current.set(phase);
        Ok(PhaseGuard {
            tracker: self,
            phase,
        })
    }
}

/// Clears the phase when dropped.
pub(crate) struct PhaseGuard<'a> {
    tracker: &'a PhaseTracker,
    phase: Phase,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.tracker.current.get(),
            self.phase,
            "phase changed underneath its guard"
        );
        self.tracker.current.set(Phase::None);
    }
}
