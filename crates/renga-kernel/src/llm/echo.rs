//! Deterministic local capability.
//!
//! Echoes the prompt back, followed by a one-line summary of the context it
//! was given. Used by the CLI and as a reference implementation of
//! [`CompletionCapability`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::stream::{CompletionStream, StreamEvent};
use super::{CompletionCapability, CompletionRequest, LlmError, LlmResult};

/// Streams the prompt back word by word.
#[derive(Debug, Clone, Default)]
pub struct EchoCapability {
    delay: Option<Duration>,
}

impl EchoCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The full text this capability produces for `request`.
    ///
    /// References are counted by their `[label: ` openings, so a referenced
    /// block whose content spans several paragraphs still counts once.
    pub fn render(request: &CompletionRequest) -> String {
        let refs = request
            .reference_context
            .as_deref()
            .map(|ctx| ctx.split("\n\n").filter(|part| is_reference_entry(part)).count())
            .unwrap_or(0);
        format!(
            "{} (prior: {}, references: {})",
            request.prompt.trim(),
            request.prior.len(),
            refs
        )
    }
}

fn is_reference_entry(part: &str) -> bool {
    part.strip_prefix('[')
        .and_then(|rest| rest.split_once(": "))
        .is_some_and(|(label, _)| !label.is_empty() && !label.contains(char::is_whitespace))
}

#[async_trait]
impl CompletionCapability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    async fn route(&self, request: CompletionRequest) -> LlmResult<CompletionStream> {
        if request.prompt.trim().is_empty() {
            return Err(LlmError::InvalidRequest("empty prompt".into()));
        }

        let text = Self::render(&request);
        let fragments: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();

        let delay = self.delay;
        let deltas = futures::stream::iter(fragments).then(move |fragment| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            StreamEvent::TextDelta(fragment)
        });
        let done = futures::stream::once(async {
            StreamEvent::Done {
                stop_reason: Some("end_turn".into()),
            }
        });

        Ok(deltas.chain(done).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[tokio::test]
    async fn test_echo_streams_rendered_text() {
        let request = CompletionRequest::new("Summarize the index")
            .with_prior(vec![Message::user("earlier")])
            .with_reference_context("[a: 1]\n\n[b: 2]");
        let expected = EchoCapability::render(&request);
        assert_eq!(expected, "Summarize the index (prior: 1, references: 2)");

        let stream = EchoCapability::new().route(request).await.unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;

        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
        let text: String = events.iter().filter_map(StreamEvent::as_delta).collect();
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_counts_multi_paragraph_reference_once() {
        let request = CompletionRequest::new("Compare")
            .with_reference_context("[nasdaq: up today\n\nand up this week]\n\n[dow: flat]");
        assert_eq!(
            EchoCapability::render(&request),
            "Compare (prior: 0, references: 2)"
        );
    }

    #[tokio::test]
    async fn test_echo_rejects_blank_prompt() {
        let result = EchoCapability::new().route(CompletionRequest::new("  ")).await;
        assert!(matches!(result, Err(LlmError::InvalidRequest(_))));
    }
}
