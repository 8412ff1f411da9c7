//! Typed identifiers for blocks and sessions.
//!
//! Both ID types wrap a random UUIDv4. Random rather than time-ordered so that
//! a short hex prefix is enough to tell two blocks apart; mentions address
//! blocks by that prefix when no alias is set. The `short()` form (first 8 hex
//! chars) is the display label for unnamed blocks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A block identifier (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(uuid::Uuid);

/// A session identifier (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new random ID (UUIDv4).
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// First 8 hex characters, used as a display label.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character lowercase hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// Prefer a label for display; fall back to short hex.
            pub fn display_or(&self, label: Option<&str>) -> String {
                match label {
                    Some(l) if !l.is_empty() => l.to_string(),
                    _ => self.short(),
                }
            }

            /// Case-insensitive hex prefix match. An empty prefix never matches.
            pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
                !prefix.is_empty() && self.to_hex().starts_with(&prefix.to_ascii_lowercase())
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(SessionId, "SessionId");

// ── Prefix resolution ───────────────────────────────────────────────────────

/// Error from alias / prefix resolution.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("no match for '{0}'")]
    NoMatch(String),
    #[error("ambiguous prefix '{prefix}': matches {candidates:?}")]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Resolve a query against a set of block IDs and optional aliases.
///
/// Resolution order:
/// 1. Exact alias match (case-insensitive)
/// 2. Unique hex prefix match (case-insensitive)
/// 3. Error (no match or ambiguous)
pub fn resolve_block_prefix<'a>(
    blocks: impl Iterator<Item = (BlockId, Option<&'a str>)>,
    query: &str,
) -> Result<BlockId, PrefixError> {
    let entries: Vec<(BlockId, Option<&str>)> = blocks.collect();

    for &(id, alias) in &entries {
        if let Some(a) = alias
            && a.eq_ignore_ascii_case(query)
        {
            return Ok(id);
        }
    }

    let hex_matches: Vec<BlockId> = entries
        .iter()
        .filter(|(id, _)| id.matches_hex_prefix(query))
        .map(|(id, _)| *id)
        .collect();

    match hex_matches.len() {
        0 => Err(PrefixError::NoMatch(query.to_string())),
        1 => Ok(hex_matches[0]),
        _ => Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: hex_matches.iter().map(|id| id.short()).collect(),
        }),
    }
}
