//! Session owner.
//!
//! One [`Session`] per open session. It is the single writer of the
//! dependency graph: every graph mutation goes through `&mut Session` and
//! completes without suspending. Refresh tasks share only the block store.

use std::collections::BTreeSet;
use std::sync::Arc;

use renga_types::{Block, BlockId, RefreshTrigger, SessionId};

use crate::cascade::cascade_dependents;
use crate::config::{CyclePolicy, RefreshConfig};
use crate::error::{ConfigError, SessionError, SessionResult};
use crate::events::RefreshEventSender;
use crate::graph::DependencyGraph;
use crate::llm::CompletionCapability;
use crate::mentions::MentionParser;
use crate::refresh::{RefreshOutcome, RefreshScheduler};
use crate::store::{SharedBlockStore, shared_block_store};

/// What a save changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub block_id: BlockId,
    /// References stored for the block after the cycle policy ran.
    pub references: BTreeSet<BlockId>,
    /// Mentioned blocks dropped because the edge would close a cycle.
    pub rejected: Vec<BlockId>,
    /// `OnDependencyChange` blocks downstream of this one, cascade order.
    pub cascade: Vec<BlockId>,
}

/// An open session: blocks, their graph, and the scheduler that refreshes them.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: RefreshConfig,
    parser: MentionParser,
    store: SharedBlockStore,
    graph: DependencyGraph,
    scheduler: RefreshScheduler,
}

impl Session {
    /// Load blocks and build the graph from their stored references.
    ///
    /// Stored references are trusted as-is; cycles already present in
    /// persisted data are kept and contained by the cascade depth.
    pub fn open(
        blocks: Vec<Block>,
        capability: Arc<dyn CompletionCapability>,
        config: RefreshConfig,
        events: RefreshEventSender,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let parser = config.mention_parser()?;
        let graph = DependencyGraph::from_blocks(&blocks);
        let store = shared_block_store(blocks);
        let scheduler = RefreshScheduler::new(store.clone(), capability, &config, events);

        let id = SessionId::new();
        tracing::info!(
            session = %id,
            blocks = store.read().len(),
            edges = graph.edge_count(),
            "session opened"
        );

        Ok(Self {
            id,
            config,
            parser,
            store,
            graph,
            scheduler,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn store(&self) -> &SharedBlockStore {
        &self.store
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Owned copy of a block as currently stored.
    pub fn block(&self, id: BlockId) -> Option<Block> {
        self.store.read().get(id).cloned()
    }

    /// Owned copies of every block, in display order.
    pub fn blocks(&self) -> Vec<Block> {
        self.store.read().snapshot()
    }

    /// Run the on-open pass.
    pub async fn refresh_on_open(&self) -> Vec<RefreshOutcome> {
        self.scheduler.run_on_open().await
    }

    /// Store a block, re-deriving its references from its content and prompt.
    ///
    /// Any reference set on the incoming block is replaced. Under
    /// [`CyclePolicy::Reject`] a mention that would close a cycle is dropped
    /// and listed in [`SaveOutcome::rejected`].
    #[tracing::instrument(skip(self, block), name = "session.save", fields(block_id = %block.id))]
    pub fn save_block(&mut self, mut block: Block) -> SaveOutcome {
        let mentioned = {
            let store = self.store.read();
            self.parser.references_for(&block, store.all())
        };

        let mut rejected = Vec::new();
        let references: BTreeSet<BlockId> = match self.config.cycle_policy {
            CyclePolicy::Allow => mentioned,
            CyclePolicy::Reject => mentioned
                .into_iter()
                .filter(|&target| {
                    if self.graph.would_create_cycle(block.id, target) {
                        tracing::warn!(%target, "reference would close a cycle, rejecting");
                        rejected.push(target);
                        false
                    } else {
                        true
                    }
                })
                .collect(),
        };

        block.references = references.clone();
        let block_id = block.id;
        self.graph.update_block(&block);
        self.store.write().upsert(block);

        let cascade = self.cascade_for(block_id);
        tracing::debug!(
            references = references.len(),
            rejected = rejected.len(),
            cascade = cascade.len(),
            "block saved"
        );

        SaveOutcome {
            block_id,
            references,
            rejected,
            cascade,
        }
    }

    /// Save, then run the cascade pass for the saved block.
    pub async fn save_and_refresh(&mut self, block: Block) -> (SaveOutcome, Vec<RefreshOutcome>) {
        let saved = self.save_block(block);
        let outcomes = self.scheduler.run_cascade(&saved.cascade).await;
        (saved, outcomes)
    }

    /// Remove a block from the store and the graph.
    ///
    /// Dependents keep their content but lose the reference. A refresh
    /// already in flight for the block settles normally; its output is not
    /// stored.
    #[tracing::instrument(skip(self), name = "session.delete")]
    pub fn delete_block(&mut self, id: BlockId) -> SessionResult<Block> {
        let removed = self
            .store
            .write()
            .remove(id)
            .ok_or(SessionError::UnknownBlock(id))?;
        self.graph.remove_block(id);
        tracing::debug!("block deleted");
        Ok(removed)
    }

    /// Refresh one block now, whatever its trigger.
    pub async fn refresh_block(&self, id: BlockId) -> SessionResult<RefreshOutcome> {
        if !self.store.read().contains(id) {
            return Err(SessionError::UnknownBlock(id));
        }
        Ok(self.scheduler.refresh_block(id).await)
    }

    /// Downstream blocks that would refresh if `id` changed.
    pub fn cascade_for(&self, id: BlockId) -> Vec<BlockId> {
        let store = self.store.read();
        cascade_dependents(&self.graph, id, self.config.max_cascade_depth)
            .into_iter()
            .filter(|dep| {
                store
                    .get(*dep)
                    .is_some_and(|b| b.refresh_trigger() == RefreshTrigger::OnDependencyChange)
            })
            .collect()
    }

    /// Drop the graph and hand back the final blocks.
    #[tracing::instrument(skip(self), name = "session.close", fields(session = %self.id))]
    pub fn close(self) -> Vec<Block> {
        let blocks = self.store.read().snapshot();
        tracing::info!(blocks = blocks.len(), "session closed");
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::refresh_channel;
    use crate::llm::EchoCapability;
    use renga_types::BlockBuilder;

    fn open(blocks: Vec<Block>, config: RefreshConfig) -> Session {
        let (tx, _rx) = refresh_channel();
        Session::open(blocks, Arc::new(EchoCapability::new()), config, tx).unwrap()
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let (tx, _rx) = refresh_channel();
        let config = RefreshConfig::default().with_max_concurrent(0);
        let result = Session::open(Vec::new(), Arc::new(EchoCapability::new()), config, tx);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_save_derives_references_from_mentions() {
        let nasdaq = BlockBuilder::new(BlockId::new(), 0).alias("nasdaq").content("18k").build();
        let mut session = open(vec![nasdaq.clone()], RefreshConfig::default());

        let summary = BlockBuilder::new(BlockId::new(), 1)
            .content("<p>Summarize @block:nasdaq and @block:ghost</p>")
            .reference(BlockId::new())
            .build();
        let outcome = session.save_block(summary.clone());

        assert_eq!(outcome.references, BTreeSet::from([nasdaq.id]));
        assert!(outcome.rejected.is_empty());
        assert_eq!(session.block(summary.id).unwrap().references, outcome.references);
        assert_eq!(session.graph().direct_dependents(nasdaq.id), &BTreeSet::from([summary.id]));
    }

    #[test]
    fn test_cycle_rejected_by_default() {
        let a = BlockBuilder::new(BlockId::new(), 0).alias("alpha").content("base").build();
        let mut session = open(vec![a.clone()], RefreshConfig::default());
        session.save_block(BlockBuilder::new(BlockId::new(), 1).alias("beta").content("@block:alpha").build());

        let mut a2 = a.clone();
        a2.content = "now @block:beta".into();
        let outcome = session.save_block(a2);

        assert!(outcome.references.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert!(session.graph().is_consistent());
    }

    #[test]
    fn test_cycle_allowed_when_configured() {
        let a = BlockBuilder::new(BlockId::new(), 0).alias("alpha").content("base").build();
        let config = RefreshConfig::default().with_cycle_policy(CyclePolicy::Allow);
        let mut session = open(vec![a.clone()], config);
        let b = session.save_block(BlockBuilder::new(BlockId::new(), 1).alias("beta").content("@block:alpha").build());

        let mut a2 = a.clone();
        a2.content = "now @block:beta".into();
        let outcome = session.save_block(a2);

        assert_eq!(outcome.references, BTreeSet::from([b.block_id]));
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_delete_scrubs_graph_and_store() {
        let a = BlockBuilder::new(BlockId::new(), 0).alias("alpha").content("base").build();
        let b = BlockBuilder::new(BlockId::new(), 1).reference(a.id).build();
        let mut session = open(vec![a.clone(), b.clone()], RefreshConfig::default());

        let removed = session.delete_block(a.id).unwrap();
        assert_eq!(removed.id, a.id);
        assert!(session.block(b.id).unwrap().references.is_empty());
        assert!(session.graph().is_empty());
        assert_eq!(session.delete_block(a.id), Err(SessionError::UnknownBlock(a.id)));
    }

    #[tokio::test]
    async fn test_refresh_unknown_block_is_an_error() {
        let session = open(Vec::new(), RefreshConfig::default());
        let id = BlockId::new();
        assert_eq!(session.refresh_block(id).await, Err(SessionError::UnknownBlock(id)));
    }
}
