//! Mention extraction and resolution.
//!
//! A mention is `@` + a literal prefix + three or more alphanumerics, matched
//! case-insensitively. With the default prefix that reads `@block:nasdaq`.
//! The name part resolves to a block by exact alias first, then by id hex
//! prefix. Mentions that resolve to nothing (or to more than one block) are
//! dropped without error.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use renga_types::{Block, BlockId, PrefixError, resolve_block_prefix};

use crate::text::strip_markup;

/// Literal that follows `@` in a mention.
pub const DEFAULT_MENTION_PREFIX: &str = "block:";

static DEFAULT_PARSER: LazyLock<MentionParser> = LazyLock::new(|| {
    MentionParser::new(DEFAULT_MENTION_PREFIX).expect("valid default mention pattern")
});

/// Render a referenced block as a labelled bracket.
pub fn format_reference(label: &str, content: &str) -> String {
    format!("[{}: {}]", label, content)
}

/// Parses and resolves mentions for one prefix.
#[derive(Debug, Clone)]
pub struct MentionParser {
    prefix: String,
    pattern: Regex,
}

impl Default for MentionParser {
    fn default() -> Self {
        DEFAULT_PARSER.clone()
    }
}

impl MentionParser {
    /// Build a parser for `@{prefix}name` mentions.
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?i)@{}([a-z0-9]{{3,}})",
            regex::escape(prefix)
        ))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mention tokens in order of first appearance, lowercased, without duplicates.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut tokens = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            let token = caps[1].to_ascii_lowercase();
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
        tokens
    }

    /// Resolve one token: alias (case-insensitive) first, then id hex prefix.
    pub fn resolve<'a, I>(&self, token: &str, blocks: I) -> Option<BlockId>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        let entries = blocks.into_iter().map(|b| (b.id, b.alias.as_deref()));
        match resolve_block_prefix(entries, token) {
            Ok(id) => Some(id),
            Err(PrefixError::NoMatch(_)) => {
                tracing::debug!(token, "mention matches no block, dropping");
                None
            }
            Err(PrefixError::Ambiguous { candidates, .. }) => {
                tracing::debug!(token, ?candidates, "mention is ambiguous, dropping");
                None
            }
        }
    }

    /// Resolve every mention in `text` to a block id.
    pub fn resolve_all<'a, I>(&self, text: &str, blocks: I) -> BTreeSet<BlockId>
    where
        I: IntoIterator<Item = &'a Block> + Clone,
    {
        self.extract(text)
            .iter()
            .filter_map(|token| self.resolve(token, blocks.clone()))
            .collect()
    }

    /// The reference set for `block`, derived from its stripped content and
    /// its stored prompt.
    ///
    /// Once a live block has been regenerated its mentions survive only in
    /// `original_prompt`. A block never references itself.
    pub fn references_for<'a, I>(&self, block: &Block, blocks: I) -> BTreeSet<BlockId>
    where
        I: IntoIterator<Item = &'a Block> + Clone,
    {
        let mut refs = self.resolve_all(&strip_markup(&block.content), blocks.clone());
        if let Some(prompt) = block.original_prompt.as_deref() {
            refs.extend(self.resolve_all(&strip_markup(prompt), blocks));
        }
        refs.remove(&block.id);
        refs
    }

    /// Replace each resolvable mention with the referenced block's stripped
    /// content, wrapped as `[label: content]`. Unresolvable mentions stay as written.
    pub fn inline<'a, I>(&self, text: &str, blocks: I) -> String
    where
        I: IntoIterator<Item = &'a Block> + Clone,
    {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let token = caps[1].to_ascii_lowercase();
                let found = self
                    .resolve(&token, blocks.clone())
                    .and_then(|id| blocks.clone().into_iter().find(|b| b.id == id));
                match found {
                    Some(block) => format_reference(&block.label(), &strip_markup(&block.content)),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Extract mention tokens with the default prefix.
pub fn extract_mentions(text: &str) -> Vec<String> {
    DEFAULT_PARSER.extract(text)
}

/// Resolve one mention token with the default rules.
pub fn resolve_mention<'a, I>(token: &str, blocks: I) -> Option<BlockId>
where
    I: IntoIterator<Item = &'a Block>,
{
    DEFAULT_PARSER.resolve(token, blocks)
}

/// References for content owned by `self_id`, with the default prefix.
pub fn resolve_references<'a, I>(content: &str, blocks: I, self_id: BlockId) -> BTreeSet<BlockId>
where
    I: IntoIterator<Item = &'a Block> + Clone,
{
    let mut refs = DEFAULT_PARSER.resolve_all(&strip_markup(content), blocks);
    refs.remove(&self_id);
    refs
}

/// Inline mentions with the default prefix.
pub fn inline_mentions<'a, I>(text: &str, blocks: I) -> String
where
    I: IntoIterator<Item = &'a Block> + Clone,
{
    DEFAULT_PARSER.inline(text, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use renga_types::BlockBuilder;

    fn named(order: i64, alias: &str, content: &str) -> Block {
        BlockBuilder::new(BlockId::new(), order)
            .alias(alias)
            .content(content)
            .build()
    }

    #[test]
    fn test_extract_lowercases_and_dedupes() {
        let tokens = extract_mentions("see @block:NASDAQ and @block:dow, again @block:nasdaq");
        assert_eq!(tokens, vec!["nasdaq".to_string(), "dow".to_string()]);
    }

    #[test]
    fn test_extract_requires_three_chars() {
        assert!(extract_mentions("@block:ab is too short").is_empty());
        assert_eq!(extract_mentions("@block:abc."), vec!["abc".to_string()]);
    }

    #[test]
    fn test_extract_requires_prefix() {
        assert!(extract_mentions("@nasdaq and block:nasdaq").is_empty());
        assert_eq!(extract_mentions("@BLOCK:spx"), vec!["spx".to_string()]);
    }

    #[test]
    fn test_custom_prefix() {
        let parser = MentionParser::new("ref.").unwrap();
        assert_eq!(parser.prefix(), "ref.");
        assert_eq!(parser.extract("@ref.abc @refxabc"), vec!["abc".to_string()]);
    }

    #[test]
    fn test_resolve_by_alias_then_prefix() {
        let nasdaq = named(0, "nasdaq", "index");
        let plain = Block::new(BlockId::new(), 1, "no alias");
        let blocks = vec![nasdaq.clone(), plain.clone()];
        let parser = MentionParser::default();

        assert_eq!(parser.resolve("nasdaq", &blocks), Some(nasdaq.id));
        let prefix = plain.id.to_hex()[..8].to_string();
        assert_eq!(parser.resolve(&prefix, &blocks), Some(plain.id));
        assert_eq!(parser.resolve("missing", &blocks), None);
    }

    #[test]
    fn test_references_for_drops_dangling_and_self() {
        let nasdaq = named(0, "nasdaq", "index");
        let mut me = named(1, "mine", "");
        me.content = "<p>compare @block:nasdaq with @block:ghost and @block:mine</p>".into();
        let blocks = vec![nasdaq.clone(), me.clone()];

        let refs = MentionParser::default().references_for(&me, &blocks);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![nasdaq.id]);
    }

    #[test]
    fn test_references_for_keeps_prompt_mentions() {
        let nasdaq = named(0, "nasdaq", "index");
        let dow = named(1, "dow", "index");
        let mut summary = named(2, "summary", "NASDAQ rose today.");
        summary.original_prompt = Some("Summarize @block:nasdaq".into());
        summary.content.push_str(" See @block:dow.");
        let blocks = vec![nasdaq.clone(), dow.clone(), summary.clone()];

        let refs = MentionParser::default().references_for(&summary, &blocks);
        assert_eq!(refs, BTreeSet::from([nasdaq.id, dow.id]));
    }

    #[test]
    fn test_resolve_references_excludes_self() {
        let nasdaq = named(0, "nasdaq", "index");
        let dow = named(1, "dow", "index");
        let blocks = vec![nasdaq.clone(), dow.clone()];

        let refs = resolve_references("@block:nasdaq vs @block:dow", &blocks, dow.id);
        assert_eq!(refs, BTreeSet::from([nasdaq.id]));
        assert_eq!(resolve_mention("DOW", &blocks), Some(dow.id));
    }

    #[test]
    fn test_inline_substitutes_known_mentions() {
        let nasdaq = named(0, "nasdaq", "<p>NASDAQ closed at 100</p>");
        let blocks = vec![nasdaq];
        let out = inline_mentions("Summarize @block:Nasdaq and @block:ghost", &blocks);
        assert_eq!(out, "Summarize [nasdaq: NASDAQ closed at 100] and @block:ghost");
    }
}
