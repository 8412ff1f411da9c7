//! Bounded cascade resolution.
//!
//! When a block changes, every block that transitively reads from it is stale.
//! The walk is capped at [`MAX_CASCADE_DEPTH`] hops: blocks further out keep
//! their old output until refreshed by hand. The cap also contains any cycle
//! that slipped into persisted data.

use std::collections::{HashSet, VecDeque};

use renga_types::BlockId;

use crate::graph::DependencyGraph;

/// Maximum hops explored from the changed block.
pub const MAX_CASCADE_DEPTH: usize = 3;

/// Breadth-first walk of the dependents index.
///
/// Starts from the direct dependents of `origin` (depth 1) and expands until
/// `max_depth` hops have been explored. Each block appears at most once, in
/// discovery order; `origin` itself never appears.
pub fn cascade_dependents(graph: &DependencyGraph, origin: BlockId, max_depth: usize) -> Vec<BlockId> {
    let mut order = Vec::new();
    let mut visited = HashSet::from([origin]);
    let mut queue: VecDeque<(BlockId, usize)> = VecDeque::from([(origin, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for &dependent in graph.direct_dependents(current) {
            if visited.insert(dependent) {
                order.push(dependent);
                queue.push_back((dependent, depth + 1));
            }
        }
    }

    order
}
