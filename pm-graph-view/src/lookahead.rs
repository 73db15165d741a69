// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-level-ahead prefetch deciding whether a node shows an expand control.
//!
//! After a node's children were fetched, the builder fetches each child's own children in the
//! same direction and stores them as the child's lookahead. The children's `children` field stays
//! unset, expanding them later is still a separate fetch.
use std::collections::{HashMap, HashSet};

use futures_util::future::join_all;
use tracing::{debug, trace};

use crate::fetcher::AdjacencyFetcher;
use crate::node::{Direction, GraphNode, Lookahead, NodeId, NodeTypeSet, TreeSide};
use crate::service::GraphService;

/// Identifies lookahead results which can be shared between tree positions.
///
/// The same remote node yields the same next level as long as it is fetched in the same
/// direction and in the same role (structural node or association stand-in).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LookaheadKey {
    pub node: NodeId,
    pub direction: Direction,
    pub association: bool,
}

impl LookaheadKey {
    pub fn new(node: &GraphNode, side: TreeSide, direction: Direction) -> Self {
        Self {
            node: node.expansion_id(side).clone(),
            direction,
            association: node.is_association(),
        }
    }
}

/// Lookahead results already held by a tree, keyed by remote id.
pub type LookaheadIndex = HashMap<LookaheadKey, Vec<GraphNode>>;

pub struct LookaheadBuilder<'a, S> {
    fetcher: &'a AdjacencyFetcher<S>,
}

impl<'a, S> LookaheadBuilder<'a, S>
where
    S: GraphService,
{
    pub fn new(fetcher: &'a AdjacencyFetcher<S>) -> Self {
        Self { fetcher }
    }

    /// Populate the lookahead of every given child.
    ///
    /// Fetches run concurrently. A failed fetch records "checked, found none" for that child
    /// only. Results present in `index` are reused instead of fetched again.
    pub async fn build(
        &self,
        children: Vec<GraphNode>,
        direction: Direction,
        allowed: &NodeTypeSet,
        index: &LookaheadIndex,
    ) -> Vec<GraphNode> {
        let side = self.fetcher.side();

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for child in &children {
            let key = LookaheadKey::new(child, side, direction);
            if index.contains_key(&key) {
                trace!(node_id = %key.node, "reusing cached lookahead");
                continue;
            }
            if seen.insert(key.clone()) {
                pending.push((key, child));
            }
        }

        let fetched: HashMap<LookaheadKey, Vec<GraphNode>> =
            join_all(pending.into_iter().map(|(key, child)| async move {
                let nodes = match self.fetcher.fetch_children(child, direction, allowed).await {
                    Ok(nodes) => nodes,
                    Err(err) => {
                        debug!(node_id = %key.node, "lookahead fetch failed: {err}");
                        Vec::new()
                    }
                };
                (key, nodes)
            }))
            .await
            .into_iter()
            .collect();

        children
            .into_iter()
            .map(|mut child| {
                let key = LookaheadKey::new(&child, side, direction);
                let nodes = index
                    .get(&key)
                    .or_else(|| fetched.get(&key))
                    .cloned()
                    .unwrap_or_default();
                child.lookahead = Lookahead::checked(direction, nodes);
                child
            })
            .collect()
    }
}
