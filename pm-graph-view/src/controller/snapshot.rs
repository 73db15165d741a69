// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};

use crate::node::{Affordance, Direction, GraphNode, NodeType, NodeTypeSet, TreeSide, UiId};
use crate::tree::Tree;

/// Immutable view of one graph tree, as handed to the presentation layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Tree with the visibility filter applied.
    pub(crate) tree: Tree,
    pub(crate) side: TreeSide,
    pub(crate) visible_types: NodeTypeSet,
    pub(crate) open: HashMap<UiId, Direction>,
    pub(crate) loading: HashSet<UiId>,
    pub(crate) descendants: HashSet<UiId>,
    pub(crate) active_descendants_root: Option<UiId>,
    pub(crate) selected: Option<UiId>,
}

impl Snapshot {
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn side(&self) -> TreeSide {
        self.side
    }

    pub fn visible_types(&self) -> NodeTypeSet {
        self.visible_types
    }

    pub fn is_open(&self, ui_id: UiId) -> bool {
        self.open.contains_key(&ui_id)
    }

    /// Direction the children of an open node were fetched in.
    pub fn direction(&self, ui_id: UiId) -> Option<Direction> {
        self.open.get(&ui_id).copied()
    }

    pub fn is_loading(&self, ui_id: UiId) -> bool {
        self.loading.contains(&ui_id)
    }

    /// Return `true` if the node is displayed as the result of a descendant fetch.
    pub fn is_descendant(&self, ui_id: UiId) -> bool {
        self.descendants.contains(&ui_id)
    }

    pub fn descendants(&self) -> &HashSet<UiId> {
        &self.descendants
    }

    pub fn active_descendants_root(&self) -> Option<UiId> {
        self.active_descendants_root
    }

    pub fn selected(&self) -> Option<UiId> {
        self.selected
    }

    /// Expand control or leaf marker for a node.
    ///
    /// Open nodes are decided by their loaded children, closed nodes by their lookahead.
    pub fn affordance(&self, node: &GraphNode) -> Affordance {
        match node.children() {
            Some(children) if self.is_open(node.ui_id) => {
                if children.is_empty() {
                    Affordance::Leaf
                } else {
                    Affordance::Expandable
                }
            }
            _ => node.affordance(),
        }
    }

    /// Return `true` if the descendants toggle is offered for the node.
    ///
    /// Policy classes have no descendants and associations are leaves for this purpose.
    pub fn offers_descendant_toggle(&self, node: &GraphNode) -> bool {
        offers_descendant_toggle(node)
    }

    /// Return `true` if the node's children are currently shown in descendant mode.
    pub fn shows_descendants(&self, node: &GraphNode) -> bool {
        node.children()
            .is_some_and(|children| children.iter().any(|child| self.is_descendant(child.ui_id)))
    }
}

pub(crate) fn offers_descendant_toggle(node: &GraphNode) -> bool {
    !node.is_association() && node.node_type() != NodeType::PolicyClass
}
