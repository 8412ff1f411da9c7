//! Bidirectional dependency index over block references.
//!
//! Two maps kept as exact inverses:
//!
//! ```text
//! references:  B ──▶ {A}        "B reads from A"
//! dependents:  A ──▶ {B}        "A is read by B"
//! ```
//!
//! Empty sets are never stored, so every key in either map has at least one
//! edge and every edge appears in both maps. The graph holds ids only; block
//! content lives in the [`BlockStore`](crate::store::BlockStore).
//!
//! Mutation is synchronous and single-owner: the [`Session`](crate::session::Session)
//! holds the graph by value and no method here suspends.

use std::collections::{BTreeSet, HashMap};

use renga_types::{Block, BlockId};

use crate::cascade::{MAX_CASCADE_DEPTH, cascade_dependents};

static EMPTY: BTreeSet<BlockId> = BTreeSet::new();

/// Forward references and reverse dependents for one session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    references: HashMap<BlockId, BTreeSet<BlockId>>,
    dependents: HashMap<BlockId, BTreeSet<BlockId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh graph from every block's reference set.
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut graph = Self::new();
        graph.build_graph(blocks);
        graph
    }

    /// Clear and rebuild both maps. O(total references).
    pub fn build_graph<'a>(&mut self, blocks: impl IntoIterator<Item = &'a Block>) {
        self.references.clear();
        self.dependents.clear();
        for block in blocks {
            self.insert_edges(block.id, &block.references);
        }
    }

    /// Index a newly saved block.
    pub fn add_block(&mut self, block: &Block) {
        self.update_block(block);
    }

    /// Replace a block's forward edges with its current reference set.
    pub fn update_block(&mut self, block: &Block) {
        self.drop_forward_edges(block.id);
        self.insert_edges(block.id, &block.references);
    }

    /// Remove a block and every edge that names it.
    ///
    /// Dependents lose their forward edge to `id` as well, so afterwards no
    /// entry in either map mentions `id`.
    pub fn remove_block(&mut self, id: BlockId) {
        self.drop_forward_edges(id);
        if let Some(dependents) = self.dependents.remove(&id) {
            for dependent in dependents {
                if let Some(refs) = self.references.get_mut(&dependent) {
                    refs.remove(&id);
                    if refs.is_empty() {
                        self.references.remove(&dependent);
                    }
                }
            }
        }
    }

    /// Blocks that reference `id` directly.
    pub fn direct_dependents(&self, id: BlockId) -> &BTreeSet<BlockId> {
        self.dependents.get(&id).unwrap_or(&EMPTY)
    }

    /// Blocks that `id` references directly.
    pub fn references(&self, id: BlockId) -> &BTreeSet<BlockId> {
        self.references.get(&id).unwrap_or(&EMPTY)
    }

    /// Would adding the edge `from → to` ("from references to") close a cycle?
    ///
    /// Walks forward references from `to`; true if `from` is reachable.
    /// A self-edge is always a cycle.
    pub fn would_create_cycle(&self, from: BlockId, to: BlockId) -> bool {
        if from == to {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![to];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for &next in self.references(current) {
                if next == from {
                    return true;
                }
                stack.push(next);
            }
        }
        false
    }

    /// Transitive dependents of `id` within [`MAX_CASCADE_DEPTH`] hops, BFS order.
    pub fn cascade_dependents(&self, id: BlockId) -> Vec<BlockId> {
        cascade_dependents(self, id, MAX_CASCADE_DEPTH)
    }

    /// Number of blocks with at least one edge in either direction.
    pub fn len(&self) -> usize {
        let mut ids: BTreeSet<BlockId> = self.references.keys().copied().collect();
        ids.extend(self.dependents.keys().copied());
        ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.dependents.is_empty()
    }

    /// Total number of reference edges.
    pub fn edge_count(&self) -> usize {
        self.references.values().map(BTreeSet::len).sum()
    }

    /// Check the inverse invariant and the no-empty-set rule.
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.references.iter().all(|(from, targets)| {
            !targets.is_empty()
                && targets
                    .iter()
                    .all(|to| self.dependents.get(to).is_some_and(|d| d.contains(from)))
        });
        let reverse_ok = self.dependents.iter().all(|(to, sources)| {
            !sources.is_empty()
                && sources
                    .iter()
                    .all(|from| self.references.get(from).is_some_and(|r| r.contains(to)))
        });
        forward_ok && reverse_ok
    }

    fn insert_edges(&mut self, id: BlockId, targets: &BTreeSet<BlockId>) {
        if targets.is_empty() {
            return;
        }
        for &target in targets {
            self.dependents.entry(target).or_default().insert(id);
        }
        self.references
            .entry(id)
            .or_default()
            .extend(targets.iter().copied());
    }

    fn drop_forward_edges(&mut self, id: BlockId) {
        let Some(old) = self.references.remove(&id) else {
            return;
        };
        for target in old {
            if let Some(deps) = self.dependents.get_mut(&target) {
                deps.remove(&id);
                if deps.is_empty() {
                    self.dependents.remove(&target);
                }
            }
        }
    }
}
