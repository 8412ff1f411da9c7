//! Provider-agnostic streaming events for completions.
//!
//! ```text
//! ┌──────────────────┐        ┌─────────────────────┐        ┌──────────────┐
//! │ CompletionCap.   │──────▶ │ CompletionStream    │──────▶ │ Scheduler    │
//! │ route(request)   │        │ TextDelta… Done     │        │ Aggregator + │
//! └──────────────────┘        └─────────────────────┘        │ RefreshEvent │
//!                                                            └──────────────┘
//! ```

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Events produced by a completion stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental text fragment.
    TextDelta(String),

    /// Generation completed successfully.
    Done {
        /// Reason generation stopped (e.g., "end_turn", "max_tokens").
        stop_reason: Option<String>,
    },

    /// Error during generation.
    Error(String),
}

impl StreamEvent {
    /// Shorthand for a text fragment.
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    /// `Done` with no stop reason.
    pub fn done() -> Self {
        Self::Done { stop_reason: None }
    }

    /// Check if this is a terminal event (Done or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error(_))
    }

    /// Extract delta text if this is a delta event.
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta(s) => Some(s),
            _ => None,
        }
    }
}

/// The stream a capability hands back from `route`.
pub type CompletionStream = BoxStream<'static, StreamEvent>;

/// Accumulates fragments for one refresh attempt.
#[derive(Debug, Default, Clone)]
pub struct StreamAggregator {
    buffer: String,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Consume the aggregator and return the full text.
    pub fn finish(self) -> String {
        self.buffer
    }

    /// Drop accumulated text after a failure.
    pub fn discard(self) {}

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
