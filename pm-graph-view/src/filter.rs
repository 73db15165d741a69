// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use crate::node::{GraphNode, NodeTypeSet, TreeSide};
use crate::tree::Tree;

/// Hide nodes whose type is not visible.
///
/// Association pseudo-nodes are always kept. On the source side, objects and object attributes
/// directly below an association stay visible as well, they are only reachable through it. A
/// hidden node hides its whole subtree. The input tree is not modified.
pub fn filter_by_visible_types(tree: &Tree, visible: &NodeTypeSet, side: TreeSide) -> Tree {
    Tree::from_shared(filter_nodes(tree.roots(), visible, side, false))
}

fn is_visible(
    node: &GraphNode,
    visible: &NodeTypeSet,
    side: TreeSide,
    parent_is_association: bool,
) -> bool {
    node.is_association()
        || visible.contains(node.node_type())
        || (side == TreeSide::Source && parent_is_association && node.node_type().is_object_like())
}

fn filter_nodes(
    nodes: &[Arc<GraphNode>],
    visible: &NodeTypeSet,
    side: TreeSide,
    parent_is_association: bool,
) -> Vec<Arc<GraphNode>> {
    nodes
        .iter()
        .filter(|node| is_visible(node, visible, side, parent_is_association))
        .map(|node| {
            let Some(children) = node.children() else {
                return node.clone();
            };

            let filtered = filter_nodes(children, visible, side, node.is_association());
            let unchanged = filtered.len() == children.len()
                && filtered
                    .iter()
                    .zip(children)
                    .all(|(after, before)| Arc::ptr_eq(after, before));
            if unchanged {
                // Nothing below was hidden, keep sharing the subtree.
                node.clone()
            } else {
                Arc::new(GraphNode {
                    children: Some(filtered),
                    ..(**node).clone()
                })
            }
        })
        .collect()
}
