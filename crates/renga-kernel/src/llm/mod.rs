//! Completion capability abstraction.
//!
//! The scheduler never talks to a model directly. It hands a
//! [`CompletionRequest`] to whatever [`CompletionCapability`] the session was
//! opened with and consumes the resulting [`CompletionStream`]. Provider
//! choice, prompting, and wire protocol live behind the trait.

mod echo;
pub mod stream;

pub use echo::EchoCapability;
pub use stream::{CompletionStream, StreamAggregator, StreamEvent};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a message in the prior context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human/user message.
    User,
    /// Assistant/model message.
    Assistant,
}

/// A message in the prior context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a capability needs to regenerate one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The instruction to run.
    pub prompt: String,
    /// Blocks above the target, oldest first.
    pub prior: Vec<Message>,
    /// Labelled content of the blocks the target references.
    pub reference_context: Option<String>,
}

impl CompletionRequest {
    /// Create a request with no context.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            prior: Vec::new(),
            reference_context: None,
        }
    }

    /// Set the prior conversation.
    pub fn with_prior(mut self, prior: Vec<Message>) -> Self {
        self.prior = prior;
        self
    }

    /// Set the reference context.
    pub fn with_reference_context(mut self, context: impl Into<String>) -> Self {
        self.reference_context = Some(context.into());
        self
    }
}

/// Error type for completion operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// Provider not configured or unavailable.
    #[error("provider not available: {0}")]
    Unavailable(String),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// API error.
    #[error("api error: {0}")]
    Api(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(String),
}

/// Result type for completion operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Turns a prompt plus context into a stream of text fragments.
///
/// `route` resolves once the stream is open; failures after that arrive as
/// [`StreamEvent::Error`] on the stream itself.
#[async_trait]
pub trait CompletionCapability: Send + Sync {
    /// Short name for logs (e.g., "anthropic", "echo").
    fn name(&self) -> &str;

    /// Open a completion stream for `request`.
    async fn route(&self, request: CompletionRequest) -> LlmResult<CompletionStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "hello");

        let assistant = Message::assistant("hi there");
        assert_eq!(assistant.role, Role::Assistant);
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("Summarize")
            .with_prior(vec![Message::user("a"), Message::assistant("b")])
            .with_reference_context("[nasdaq: 100]");

        assert_eq!(request.prompt, "Summarize");
        assert_eq!(request.prior.len(), 2);
        assert_eq!(request.reference_context.as_deref(), Some("[nasdaq: 100]"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
