//! Scope Configuration
//!
//! Tunables for a scope's digest loop. Every field has a default, so a
//! partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};

/// Iteration bound used when no configuration is given.
pub const DEFAULT_TTL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Maximum number of dirty iterations a single digest may run before it
    /// fails with [`ScopeError::TtlExceeded`].
    pub ttl: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl ScopeConfig {
    /// Configuration with a custom iteration bound. Not validated until the
    /// scope is built.
    pub fn with_ttl(ttl: usize) -> Self {
        Self { ttl }
    }

    /// Parse and validate a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ScopeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject a `ttl` of zero, which could never converge.
    pub fn validate(&self) -> Result<()> {
        if self.ttl == 0 {
            return Err(ScopeError::InvalidConfig(
                "ttl must allow at least one iteration".to_string(),
            ));
        }
        Ok(())
    }
}
