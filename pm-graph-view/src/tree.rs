// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable tree of displayed nodes.
//!
//! Every mutation returns a new `Tree`. Subtrees which were not touched are shared between the
//! old and the new value, so readers holding an older snapshot never observe partial updates.
use std::sync::Arc;

use crate::lookahead::{LookaheadIndex, LookaheadKey};
use crate::node::{GraphNode, Lookahead, NodeId, TreeSide, UiId, sort_children};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    roots: Vec<Arc<GraphNode>>,
}

impl Tree {
    /// Create a tree from the given root nodes, sorted.
    pub fn new(roots: Vec<GraphNode>) -> Self {
        let roots: Vec<Arc<GraphNode>> = roots.into_iter().map(Arc::new).collect();
        Self {
            roots: sort_children(&roots),
        }
    }

    pub(crate) fn from_shared(roots: Vec<Arc<GraphNode>>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[Arc<GraphNode>] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes currently held, at any depth.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Depth-first, pre-order iterator over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        let mut stack: Vec<&GraphNode> = self.roots.iter().rev().map(|node| &**node).collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            if let Some(children) = node.children() {
                stack.extend(children.iter().rev().map(|child| &**child));
            }
            Some(node)
        })
    }

    pub fn find(&self, ui_id: UiId) -> Option<&GraphNode> {
        self.iter().find(|node| node.ui_id == ui_id)
    }

    pub fn contains(&self, ui_id: UiId) -> bool {
        self.find(ui_id).is_some()
    }

    /// Ids from a root down to and including the given node.
    pub fn path_to(&self, ui_id: UiId) -> Option<Vec<UiId>> {
        fn walk(nodes: &[Arc<GraphNode>], target: UiId, path: &mut Vec<UiId>) -> bool {
            for node in nodes {
                path.push(node.ui_id);
                if node.ui_id == target {
                    return true;
                }
                if let Some(children) = node.children() {
                    if walk(children, target, path) {
                        return true;
                    }
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        walk(&self.roots, ui_id, &mut path).then_some(path)
    }

    /// All positions at which the given remote node is displayed.
    pub fn find_by_node_id(&self, node_id: &NodeId) -> Vec<UiId> {
        self.iter()
            .filter(|node| node.node_id() == node_id)
            .map(|node| node.ui_id)
            .collect()
    }

    /// Ids of all nodes below the given node, depth-first. Empty if the node is unknown.
    pub fn subtree_ids(&self, ui_id: UiId) -> Vec<UiId> {
        fn collect(nodes: &[Arc<GraphNode>], ids: &mut Vec<UiId>) {
            for node in nodes {
                ids.push(node.ui_id);
                if let Some(children) = node.children() {
                    collect(children, ids);
                }
            }
        }

        let mut ids = Vec::new();
        if let Some(children) = self.find(ui_id).and_then(GraphNode::children) {
            collect(children, &mut ids);
        }
        ids
    }

    /// Replace the children of a node with a sorted copy of the given list.
    ///
    /// Returns an equal tree when the node is not present.
    pub fn replace_children(&self, ui_id: UiId, children: Vec<GraphNode>) -> Tree {
        let children: Vec<Arc<GraphNode>> = children.into_iter().map(Arc::new).collect();
        let children = sort_children(&children);
        self.update(ui_id, move |node| GraphNode {
            children: Some(children),
            ..node.clone()
        })
    }

    /// Mark a node as expanded and empty.
    pub fn clear(&self, ui_id: UiId) -> Tree {
        self.replace_children(ui_id, Vec::new())
    }

    pub fn set_lookahead(&self, ui_id: UiId, lookahead: Lookahead) -> Tree {
        self.update(ui_id, move |node| GraphNode {
            lookahead,
            ..node.clone()
        })
    }

    /// Lookahead results held anywhere in the tree, keyed for reuse by the lookahead builder.
    pub fn lookahead_index(&self, side: TreeSide) -> LookaheadIndex {
        let mut index = LookaheadIndex::new();
        for node in self.iter() {
            if let Lookahead::Checked { direction, nodes } = &node.lookahead {
                index
                    .entry(LookaheadKey::new(node, side, *direction))
                    .or_insert_with(|| nodes.to_vec());
            }
        }
        index
    }

    /// Rewrite exactly one node, copying only the path from the root down to it.
    fn update<F>(&self, ui_id: UiId, f: F) -> Tree
    where
        F: FnOnce(&GraphNode) -> GraphNode,
    {
        let mut f = Some(f);
        match rewrite(&self.roots, ui_id, &mut f) {
            Some(roots) => Tree { roots },
            None => self.clone(),
        }
    }
}

fn rewrite<F>(
    nodes: &[Arc<GraphNode>],
    ui_id: UiId,
    f: &mut Option<F>,
) -> Option<Vec<Arc<GraphNode>>>
where
    F: FnOnce(&GraphNode) -> GraphNode,
{
    for (position, node) in nodes.iter().enumerate() {
        let replacement = if node.ui_id == ui_id {
            f.take().map(|f| Arc::new(f(node)))
        } else {
            node.children()
                .and_then(|children| rewrite(children, ui_id, f))
                .map(|children| {
                    Arc::new(GraphNode {
                        children: Some(children),
                        ..(**node).clone()
                    })
                })
        };

        if let Some(replacement) = replacement {
            let mut nodes = nodes.to_vec();
            nodes[position] = replacement;
            return Some(nodes);
        }
    }

    None
}
