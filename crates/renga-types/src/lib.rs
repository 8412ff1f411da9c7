//! Shared block types for renga.
//!
//! A pure leaf crate: typed IDs, the [`Block`] content unit, and the per-block
//! refresh configuration. The kernel builds its dependency graph and refresh
//! scheduler on top of these.
//!
//! # Key Types
//!
//! |----------------------|---------------------------------------------|
//! | Type                 | Purpose                                     |
//! |----------------------|---------------------------------------------|
//! | [`BlockId`]          | Stable block address (random UUID)          |
//! | [`SessionId`]        | Which open session                          |
//! | [`Block`]            | Content unit with its reference set         |
//! | [`BlockKind`]        | user text, generated, or quote              |
//! | [`RefreshTrigger`]   | on open, on dependency change, or manual    |
//! | [`ProcessingConfig`] | Trigger plus opaque output-shaping fields   |
//! |----------------------|---------------------------------------------|

pub mod block;
pub mod ids;

pub use block::{Block, BlockBuilder, BlockKind, ProcessingConfig, RefreshTrigger};
pub use ids::{BlockId, PrefixError, SessionId, resolve_block_prefix};
