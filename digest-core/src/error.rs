//! Error types for the digest engine.

use crate::scope::{CallbackFault, Phase};

pub type Result<T> = std::result::Result<T, ScopeError>;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// The digest loop was still dirty after `ttl` iterations. Usually two
    /// watchers feed each other through their listeners.
    #[error("{ttl} digest iterations reached")]
    TtlExceeded { ttl: usize },

    /// `digest` or `apply` was invoked while the scope was already in a phase,
    /// for example from inside a listener.
    #[error("cannot start {requested}: {current} already in progress")]
    PhaseConflict { current: Phase, requested: Phase },

    /// The callback passed to `apply` panicked. The digest still ran.
    #[error(transparent)]
    Callback(#[from] CallbackFault),

    #[error("invalid scope configuration: {0}")]
    InvalidConfig(String),
}
