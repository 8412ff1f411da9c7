//! # renga-kernel
//!
//! Dependency tracking and refresh scheduling for live blocks.
//!
//! A block mentions other blocks (`@block:nasdaq`). Mentions become
//! references, references become a bidirectional graph, and the graph decides
//! which blocks go stale when one changes. Stale live blocks are regenerated
//! through an abstract [`CompletionCapability`]:
//! - `OnSessionOpen` blocks refresh concurrently (capped) when a session opens
//! - `OnDependencyChange` blocks refresh one by one, in cascade order, when an
//!   upstream block is saved
//! - anything else refreshes only on request

pub mod cascade;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod llm;
pub mod mentions;
pub mod refresh;
pub mod session;
pub mod store;
pub mod text;

pub use cascade::{MAX_CASCADE_DEPTH, cascade_dependents};
pub use config::{CyclePolicy, RefreshConfig};
pub use error::{ConfigError, RefreshError, SessionError, SessionResult};
pub use events::{RefreshEvent, RefreshEventReceiver, RefreshEventSender, refresh_channel};
pub use graph::DependencyGraph;
pub use llm::{
    CompletionCapability, CompletionRequest, CompletionStream, EchoCapability, LlmError,
    LlmResult, Message as LlmMessage, Role as LlmRole, StreamAggregator, StreamEvent,
};
pub use mentions::{
    DEFAULT_MENTION_PREFIX, MentionParser, extract_mentions, inline_mentions, resolve_mention,
    resolve_references,
};
pub use refresh::{RefreshOutcome, RefreshPlan, RefreshScheduler, RefreshState, SkipReason, plan_refresh};
pub use session::{SaveOutcome, Session};
pub use store::{BlockStore, SharedBlockStore, shared_block_store};
pub use text::strip_markup;
