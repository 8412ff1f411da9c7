//! Error types for the kernel.

use std::path::PathBuf;

use renga_types::BlockId;

use crate::llm::LlmError;

/// Why a single refresh attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The capability refused to open a stream.
    #[error("capability error: {0}")]
    Capability(#[from] LlmError),

    /// The stream reported an error mid-generation.
    #[error("stream error: {0}")]
    Stream(String),

    /// The capability panicked.
    #[error("refresh task panicked")]
    Panicked,
}

/// Session-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type SessionResult<T> = Result<T, SessionError>;
