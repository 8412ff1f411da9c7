//! Refresh lifecycle events.
//!
//! Every dispatched refresh emits one `Started`, zero or more `Chunk`s, and
//! exactly one of `Complete` or `Error`. Skipped refreshes emit nothing.
//!
//! Events travel over an unbounded mpsc channel supplied by the caller. The
//! channel is lossless; a slow consumer never causes a terminal event to be
//! dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use renga_types::BlockId;

/// Sending half of the lifecycle channel.
pub type RefreshEventSender = mpsc::UnboundedSender<RefreshEvent>;

/// Receiving half of the lifecycle channel.
pub type RefreshEventReceiver = mpsc::UnboundedReceiver<RefreshEvent>;

/// Create a lifecycle channel.
pub fn refresh_channel() -> (RefreshEventSender, RefreshEventReceiver) {
    mpsc::unbounded_channel()
}

/// One step in a block refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshEvent {
    /// The capability has been invoked.
    Started { block_id: BlockId },
    /// A text fragment arrived.
    Chunk { block_id: BlockId, text: String },
    /// Generation finished; `text` is the full output.
    Complete { block_id: BlockId, text: String },
    /// Generation failed.
    Error { block_id: BlockId, error: String },
}

impl RefreshEvent {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Started { .. } => "refresh.started",
            Self::Chunk { .. } => "refresh.chunk",
            Self::Complete { .. } => "refresh.complete",
            Self::Error { .. } => "refresh.error",
        }
    }

    /// Get the block this event concerns.
    pub fn block_id(&self) -> BlockId {
        match self {
            Self::Started { block_id }
            | Self::Chunk { block_id, .. }
            | Self::Complete { block_id, .. }
            | Self::Error { block_id, .. } => *block_id,
        }
    }

    /// Complete or Error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_and_terminals() {
        let id = BlockId::new();
        let events = [
            RefreshEvent::Started { block_id: id },
            RefreshEvent::Chunk { block_id: id, text: "a".into() },
            RefreshEvent::Complete { block_id: id, text: "a".into() },
            RefreshEvent::Error { block_id: id, error: "x".into() },
        ];
        let subjects: Vec<_> = events.iter().map(RefreshEvent::subject).collect();
        assert_eq!(
            subjects,
            ["refresh.started", "refresh.chunk", "refresh.complete", "refresh.error"]
        );
        assert!(events.iter().all(|e| e.block_id() == id));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 2);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let id = BlockId::new();
        let json = serde_json::to_value(RefreshEvent::Started { block_id: id }).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["block_id"], id.to_string());
    }
}
