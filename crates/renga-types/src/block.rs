//! Block model: content units, their kind, and per-block refresh configuration.
//!
//! A [`Block`] carries its own reference set. The dependency graph in the
//! kernel is derived from those sets; the block is the source of truth.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::BlockId;

/// What a block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Text typed by the user.
    #[default]
    #[strum(serialize = "user_text", serialize = "user", serialize = "text")]
    UserText,
    /// Text produced by the completion capability.
    #[strum(serialize = "generated", serialize = "assistant")]
    Generated,
    /// Quoted excerpt from a source document.
    Quote,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::UserText => "user_text",
            BlockKind::Generated => "generated",
            BlockKind::Quote => "quote",
        }
    }

    /// Whether this block's text came from the completion capability.
    pub fn is_generated(&self) -> bool {
        matches!(self, BlockKind::Generated)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When a block recomputes on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum RefreshTrigger {
    /// Refresh once when the session is opened.
    #[strum(serialize = "on_session_open", serialize = "open")]
    OnSessionOpen,
    /// Refresh whenever a block it (transitively) references is saved.
    #[strum(serialize = "on_dependency_change", serialize = "dependency")]
    OnDependencyChange,
    /// Only refresh when asked.
    #[default]
    Manual,
}

impl RefreshTrigger {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::OnSessionOpen => "on_session_open",
            RefreshTrigger::OnDependencyChange => "on_dependency_change",
            RefreshTrigger::Manual => "manual",
        }
    }

    /// Live blocks refresh without being asked.
    pub fn is_live(&self) -> bool {
        !matches!(self, RefreshTrigger::Manual)
    }
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-block processing configuration.
///
/// Only `refresh_trigger` is interpreted here. `schema` and `transforms` belong
/// to output-shaping collaborators and are carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub refresh_trigger: RefreshTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<serde_json::Value>,
}

impl ProcessingConfig {
    /// Config with just a trigger.
    pub fn with_trigger(refresh_trigger: RefreshTrigger) -> Self {
        Self {
            refresh_trigger,
            ..Self::default()
        }
    }
}

/// A content unit in a session.
///
/// ## Field groups
///
/// - **Core**: id, order, kind, content
/// - **Addressing**: alias (mention name)
/// - **Regeneration**: original_prompt, processing
/// - **Dependencies**: references (ids this block reads from)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Display order. Lower sorts first; ties are broken by id.
    pub order: i64,
    /// Rich text content (may contain markup).
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: BlockKind,
    /// Short name usable in mentions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// The instruction that produced this block's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingConfig>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub references: BTreeSet<BlockId>,
}

impl Block {
    /// Create a user-text block with no configuration.
    pub fn new(id: BlockId, order: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            order,
            content: content.into(),
            kind: BlockKind::UserText,
            alias: None,
            original_prompt: None,
            processing: None,
            references: BTreeSet::new(),
        }
    }

    /// The effective refresh trigger (`Manual` when unconfigured).
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.processing
            .as_ref()
            .map(|p| p.refresh_trigger)
            .unwrap_or_default()
    }

    /// Label used when this block is quoted as context: alias, else short id.
    pub fn label(&self) -> String {
        self.id.display_or(self.alias.as_deref())
    }

    /// Sort key giving the session's total order.
    pub fn sort_key(&self) -> (i64, BlockId) {
        (self.order, self.id)
    }
}

/// Builder for [`Block`] with optional fields.
///
/// ```
/// use renga_types::{BlockBuilder, BlockId, BlockKind, RefreshTrigger};
///
/// let source = BlockId::new();
/// let block = BlockBuilder::new(BlockId::new(), 2)
///     .kind(BlockKind::Generated)
///     .alias("summary")
///     .original_prompt("Summarize @block:nasdaq")
///     .trigger(RefreshTrigger::OnDependencyChange)
///     .reference(source)
///     .build();
/// assert!(block.references.contains(&source));
/// ```
pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    /// Start building a block with the two required fields.
    pub fn new(id: BlockId, order: i64) -> Self {
        Self {
            block: Block::new(id, order, ""),
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.block.content = content.into();
        self
    }

    pub fn kind(mut self, kind: BlockKind) -> Self {
        self.block.kind = kind;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.block.alias = Some(alias.into());
        self
    }

    pub fn original_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.block.original_prompt = Some(prompt.into());
        self
    }

    pub fn processing(mut self, processing: ProcessingConfig) -> Self {
        self.block.processing = Some(processing);
        self
    }

    /// Shorthand for a processing config carrying only a trigger.
    pub fn trigger(mut self, trigger: RefreshTrigger) -> Self {
        match self.block.processing.as_mut() {
            Some(p) => p.refresh_trigger = trigger,
            None => self.block.processing = Some(ProcessingConfig::with_trigger(trigger)),
        }
        self
    }

    pub fn reference(mut self, id: BlockId) -> Self {
        self.block.references.insert(id);
        self
    }

    pub fn references(mut self, ids: impl IntoIterator<Item = BlockId>) -> Self {
        self.block.references.extend(ids);
        self
    }

    /// Consume the builder and return the block.
    pub fn build(self) -> Block {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_kind_parse_aliases() {
        assert_eq!(BlockKind::from_str("generated"), Some(BlockKind::Generated));
        assert_eq!(BlockKind::from_str("ASSISTANT"), Some(BlockKind::Generated));
        assert_eq!(BlockKind::from_str("user"), Some(BlockKind::UserText));
        assert_eq!(BlockKind::from_str("Quote"), Some(BlockKind::Quote));
        assert_eq!(BlockKind::from_str("bogus"), None);
    }

    #[test]
    fn test_block_kind_serde_snake_case() {
        let json = serde_json::to_string(&BlockKind::UserText).unwrap();
        assert_eq!(json, "\"user_text\"");
        let parsed: BlockKind = serde_json::from_str("\"generated\"").unwrap();
        assert_eq!(parsed, BlockKind::Generated);
    }

    #[test]
    fn test_refresh_trigger_parse_and_display() {
        for trigger in [
            RefreshTrigger::OnSessionOpen,
            RefreshTrigger::OnDependencyChange,
            RefreshTrigger::Manual,
        ] {
            assert_eq!(RefreshTrigger::from_str(trigger.as_str()), Some(trigger));
            assert_eq!(trigger.to_string(), trigger.as_str());
        }
        assert_eq!(RefreshTrigger::from_str("OPEN"), Some(RefreshTrigger::OnSessionOpen));
    }

    #[test]
    fn test_unconfigured_block_is_manual() {
        let block = Block::new(BlockId::new(), 0, "hello");
        assert_eq!(block.refresh_trigger(), RefreshTrigger::Manual);
        assert!(!block.refresh_trigger().is_live());
    }

    #[test]
    fn test_label_prefers_alias() {
        let id = BlockId::new();
        let plain = Block::new(id, 0, "");
        assert_eq!(plain.label(), id.short());

        let named = BlockBuilder::new(id, 0).alias("nasdaq").build();
        assert_eq!(named.label(), "nasdaq");
    }

    #[test]
    fn test_builder_trigger_keeps_opaque_fields() {
        let processing = ProcessingConfig {
            refresh_trigger: RefreshTrigger::Manual,
            schema: Some(serde_json::json!({"type": "table"})),
            transforms: None,
        };
        let block = BlockBuilder::new(BlockId::new(), 1)
            .processing(processing)
            .trigger(RefreshTrigger::OnDependencyChange)
            .build();
        let p = block.processing.unwrap();
        assert_eq!(p.refresh_trigger, RefreshTrigger::OnDependencyChange);
        assert!(p.schema.is_some());
    }

    #[test]
    fn test_block_json_defaults() {
        let id = BlockId::new();
        let json = format!(r#"{{"id":"{}","order":3}}"#, id);
        let block: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block.id, id);
        assert_eq!(block.kind, BlockKind::UserText);
        assert!(block.references.is_empty());
        assert_eq!(block.refresh_trigger(), RefreshTrigger::Manual);
    }

    #[test]
    fn test_block_json_with_processing() {
        let id = BlockId::new();
        let json = format!(
            r#"{{"id":"{}","order":1,"kind":"generated","processing":{{"refresh_trigger":"on_dependency_change"}}}}"#,
            id
        );
        let block: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block.refresh_trigger(), RefreshTrigger::OnDependencyChange);
        assert!(block.kind.is_generated());
    }
}
