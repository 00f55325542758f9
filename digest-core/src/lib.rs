//! Digest Core
//!
//! This crate provides the change-propagation core used to drive UI bindings.
//! It implements:
//!
//! - Scopes holding schema-less, dynamically typed state
//! - Watchers with reference or structural comparison
//! - The digest loop: dirty checking until a fixed point, with an iteration
//!   bound that turns feedback cycles into errors
//! - Deferred queues that cooperate with the digest (`eval_async`,
//!   `apply_async`, `post_digest`)
//! - Phase tracking for code running inside the engine
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: The dynamic value type and the equality policy
//! - `scope`: Scopes, watchers, queues, phases and the digest loop
//! - `scheduler`: Host facilities that run deferred work on a later turn
//! - `config`: Digest tunables
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use digest_core::{Scope, Value};
//!
//! let scope = Scope::new();
//! scope.set("name", "Jane");
//!
//! // Derive a field from another one
//! scope.watch(
//!     |scope| scope.get("name"),
//!     |new, _old, scope| {
//!         scope.set("initial", new.as_str().and_then(|s| s.get(..1)).map(|s| format!("{s}.")));
//!     },
//! );
//!
//! // Mutate and converge
//! scope.apply(|scope| scope.set("name", "Bob"))?;
//! assert_eq!(scope.get("initial").as_str(), Some("B."));
//! ```

pub mod config;
pub mod error;
pub mod scheduler;
pub mod scope;
pub mod value;

pub use config::{ScopeConfig, DEFAULT_TTL};
pub use error::{Result, ScopeError};
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskId, TokioScheduler};
pub use scope::{
    CallbackFault, DigestSummary, FaultHandler, FaultKind, Phase, Scope, ScopeBuilder, Watcher,
    WatcherId,
};
pub use value::{are_equal, Comparison, List, Map, Value};
