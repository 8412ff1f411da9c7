//! Scheduler and session configuration.
//!
//! All fields have defaults, so an empty TOML document is a valid config:
//!
//! ```toml
//! max_concurrent = 3
//! max_cascade_depth = 3
//! mention_prefix = "block:"
//! cycle_policy = "reject"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cascade::MAX_CASCADE_DEPTH;
use crate::error::ConfigError;
use crate::mentions::{DEFAULT_MENTION_PREFIX, MentionParser};

/// Default cap on concurrent refreshes during the on-open pass.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// What to do when a saved reference would close a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Drop the offending reference and report it.
    #[default]
    Reject,
    /// Keep it; the cascade depth bound contains the loop.
    Allow,
}

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Concurrent refreshes allowed in the on-open pass.
    pub max_concurrent: usize,
    /// Hops explored by the cascade resolver.
    pub max_cascade_depth: usize,
    /// Literal between `@` and the mention name.
    pub mention_prefix: String,
    pub cycle_policy: CyclePolicy,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_cascade_depth: MAX_CASCADE_DEPTH,
            mention_prefix: DEFAULT_MENTION_PREFIX.to_string(),
            cycle_policy: CyclePolicy::default(),
        }
    }
}

impl RefreshConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent",
                reason: "must be at least 1".into(),
            });
        }
        if self.mention_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "mention_prefix",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Set the cycle policy.
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Set the mention prefix.
    pub fn with_mention_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mention_prefix = prefix.into();
        self
    }

    /// Build the mention parser for this config's prefix.
    pub fn mention_parser(&self) -> Result<MentionParser, ConfigError> {
        MentionParser::new(&self.mention_prefix).map_err(|e| ConfigError::Invalid {
            field: "mention_prefix",
            reason: e.to_string(),
        })
    }
}
