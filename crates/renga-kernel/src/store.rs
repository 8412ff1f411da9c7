//! In-memory block store for one session.
//!
//! The store holds block content; the [`DependencyGraph`](crate::graph::DependencyGraph)
//! holds edges. Refresh tasks read their inputs from the store at dispatch
//! time and write generated text back into it, so the store is shared behind
//! a lock while the graph is not.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use renga_types::{Block, BlockId};

/// Thread-safe handle to a session's blocks.
pub type SharedBlockStore = Arc<RwLock<BlockStore>>;

/// Create a shared store from an initial set of blocks.
pub fn shared_block_store(blocks: impl IntoIterator<Item = Block>) -> SharedBlockStore {
    Arc::new(RwLock::new(BlockStore::from_blocks(blocks)))
}

/// Blocks keyed by id.
#[derive(Debug, Default, Clone)]
pub struct BlockStore {
    blocks: HashMap<BlockId, Block>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Insert or replace a block. Returns the previous version.
    pub fn upsert(&mut self, block: Block) -> Option<Block> {
        self.blocks.insert(block.id, block)
    }

    /// Remove a block and scrub its id from every other block's references.
    pub fn remove(&mut self, id: BlockId) -> Option<Block> {
        let removed = self.blocks.remove(&id)?;
        for block in self.blocks.values_mut() {
            block.references.remove(&id);
        }
        Some(removed)
    }

    /// All blocks in display order.
    pub fn all(&self) -> Vec<&Block> {
        let mut blocks: Vec<&Block> = self.blocks.values().collect();
        blocks.sort_by_key(|b| b.sort_key());
        blocks
    }

    /// Owned copies of every block, in display order.
    pub fn snapshot(&self) -> Vec<Block> {
        self.all().into_iter().cloned().collect()
    }

    /// Blocks with a strictly lower `order` than `id`, in display order.
    ///
    /// Blocks sharing `id`'s order are not included. Empty if `id` is unknown.
    pub fn preceding(&self, id: BlockId) -> Vec<&Block> {
        let Some(target) = self.blocks.get(&id) else {
            return Vec::new();
        };
        let order = target.order;
        self.all()
            .into_iter()
            .take_while(|b| b.order < order)
            .collect()
    }

    /// Record generated text for a block.
    ///
    /// Replaces content and fills `original_prompt` if unset; references are
    /// left alone. Returns false if the block no longer exists.
    pub fn apply_generated(&mut self, id: BlockId, text: &str, prompt: &str) -> bool {
        let Some(block) = self.blocks.get_mut(&id) else {
            return false;
        };
        block.content = text.to_string();
        if block.original_prompt.as_deref().is_none_or(|p| p.trim().is_empty()) {
            block.original_prompt = Some(prompt.to_string());
        }
        true
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renga_types::BlockBuilder;

    #[test]
    fn test_all_sorts_by_order_then_id() {
        let a = Block::new(BlockId::new(), 2, "a");
        let b = Block::new(BlockId::new(), 0, "b");
        let c = Block::new(BlockId::new(), 1, "c");
        let store = BlockStore::from_blocks([a.clone(), b.clone(), c.clone()]);

        let order: Vec<BlockId> = store.all().iter().map(|b| b.id).collect();
        assert_eq!(order, vec![b.id, c.id, a.id]);
    }

    #[test]
    fn test_preceding_is_strictly_above() {
        let a = Block::new(BlockId::new(), 0, "a");
        let b = Block::new(BlockId::new(), 1, "b");
        let c = Block::new(BlockId::new(), 2, "c");
        let store = BlockStore::from_blocks([a.clone(), b.clone(), c.clone()]);

        let above: Vec<BlockId> = store.preceding(c.id).iter().map(|b| b.id).collect();
        assert_eq!(above, vec![a.id, b.id]);
        assert!(store.preceding(a.id).is_empty());
        assert!(store.preceding(BlockId::new()).is_empty());
    }

    #[test]
    fn test_preceding_skips_blocks_with_equal_order() {
        let a = Block::new(BlockId::new(), 0, "a");
        let b = Block::new(BlockId::new(), 1, "b");
        let c = Block::new(BlockId::new(), 1, "c");
        let store = BlockStore::from_blocks([a.clone(), b.clone(), c.clone()]);

        let above_b: Vec<BlockId> = store.preceding(b.id).iter().map(|x| x.id).collect();
        let above_c: Vec<BlockId> = store.preceding(c.id).iter().map(|x| x.id).collect();
        assert_eq!(above_b, vec![a.id]);
        assert_eq!(above_c, vec![a.id]);
    }

    #[test]
    fn test_remove_scrubs_references() {
        let a = Block::new(BlockId::new(), 0, "a");
        let b = BlockBuilder::new(BlockId::new(), 1).reference(a.id).build();
        let mut store = BlockStore::from_blocks([a.clone(), b.clone()]);

        assert!(store.remove(a.id).is_some());
        assert!(store.get(b.id).unwrap().references.is_empty());
        assert!(store.remove(a.id).is_none());
    }

    #[test]
    fn test_apply_generated_keeps_existing_prompt() {
        let a = BlockBuilder::new(BlockId::new(), 0)
            .content("old")
            .original_prompt("keep me")
            .build();
        let b = Block::new(BlockId::new(), 1, "first line");
        let mut store = BlockStore::from_blocks([a.clone(), b.clone()]);

        assert!(store.apply_generated(a.id, "new", "ignored"));
        assert_eq!(store.get(a.id).unwrap().content, "new");
        assert_eq!(store.get(a.id).unwrap().original_prompt.as_deref(), Some("keep me"));

        assert!(store.apply_generated(b.id, "out", "first line"));
        assert_eq!(store.get(b.id).unwrap().original_prompt.as_deref(), Some("first line"));

        assert!(!store.apply_generated(BlockId::new(), "x", "y"));
    }
}
