// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::filter::filter_by_visible_types;
use crate::node::{Direction, GraphNode, NodeTypeSet, TreeSide, UiId};
use crate::tree::Tree;

use super::snapshot::Snapshot;

/// Pending fetch for one node.
///
/// Captures what the node looked like when the request was issued, the result is only applied
/// if that still holds on completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub ui_id: UiId,
    pub generation: u64,
    pub direction: Direction,

    /// Open state expected on completion, `None` for a lookahead-only refresh of a closed node.
    pub open: Option<Direction>,
}

/// All mutable state of one graph view.
#[derive(Debug)]
pub(crate) struct ViewState {
    pub side: TreeSide,
    pub tree: Tree,
    pub visible_types: NodeTypeSet,

    /// Expanded nodes and the direction their children were fetched in.
    pub open: HashMap<UiId, Direction>,

    /// Nodes with a fetch in flight, with the generation the fetch was issued at.
    pub loading: HashMap<UiId, u64>,

    /// Nodes displayed as the result of a descendant fetch.
    pub descendants: HashSet<UiId>,

    /// Bumped whenever a node is collapsed or changes direction, invalidating pending fetches.
    generations: HashMap<UiId, u64>,

    pub active_descendants_root: Option<UiId>,
    pub selected: Option<UiId>,
}

impl ViewState {
    pub fn new(config: &Config) -> Self {
        Self {
            side: config.side,
            tree: Tree::default(),
            visible_types: config.visible_types,
            open: HashMap::new(),
            loading: HashMap::new(),
            descendants: HashSet::new(),
            generations: HashMap::new(),
            active_descendants_root: None,
            selected: None,
        }
    }

    pub fn node(&self, ui_id: UiId) -> Option<&GraphNode> {
        self.tree.find(ui_id)
    }

    pub fn is_loading(&self, ui_id: UiId) -> bool {
        self.loading.contains_key(&ui_id)
    }

    fn generation(&self, ui_id: UiId) -> u64 {
        self.generations.get(&ui_id).copied().unwrap_or_default()
    }

    /// Invalidate pending fetches for a node and release its loading flag.
    pub fn invalidate(&mut self, ui_id: UiId) {
        *self.generations.entry(ui_id).or_default() += 1;
        self.loading.remove(&ui_id);
    }

    /// Register a fetch for a node. Returns `None` if one is already in flight.
    pub fn begin(&mut self, ui_id: UiId, direction: Direction) -> Option<Ticket> {
        if self.is_loading(ui_id) {
            return None;
        }

        let generation = self.generation(ui_id);
        self.loading.insert(ui_id, generation);

        Some(Ticket {
            ui_id,
            generation,
            direction,
            open: self.open.get(&ui_id).copied(),
        })
    }

    /// Release the loading flag held by the given ticket, if it still holds it.
    pub fn finish(&mut self, ticket: &Ticket) {
        if self.loading.get(&ticket.ui_id) == Some(&ticket.generation) {
            self.loading.remove(&ticket.ui_id);
        }
    }

    /// Return `true` if the node is in the state the ticket was issued for.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.tree.contains(ticket.ui_id)
            && self.generation(ticket.ui_id) == ticket.generation
            && self.open.get(&ticket.ui_id).copied() == ticket.open
    }

    /// Remove descendant markings from everything below the given node.
    pub fn unmark_subtree(&mut self, ui_id: UiId) {
        for id in self.tree.subtree_ids(ui_id) {
            self.descendants.remove(&id);
        }
    }

    /// Drop bookkeeping for nodes which are no longer part of the tree.
    pub fn prune(&mut self) {
        let present: HashSet<UiId> = self.tree.iter().map(|node| node.ui_id).collect();

        self.open.retain(|id, _| present.contains(id));
        self.loading.retain(|id, _| present.contains(id));
        self.descendants.retain(|id| present.contains(id));
        self.generations.retain(|id, _| present.contains(id));

        if self
            .active_descendants_root
            .is_some_and(|id| !present.contains(&id))
        {
            self.active_descendants_root = None;
        }

        if self.selected.is_some_and(|id| !present.contains(&id)) {
            self.selected = None;
        }
    }

    /// Return `true` if `ui_id` is `ancestor` or lies below it.
    pub fn is_within(&self, ui_id: UiId, ancestor: UiId) -> bool {
        self.tree
            .path_to(ui_id)
            .is_some_and(|path| path.contains(&ancestor))
    }

    /// Reset to an empty tree, forgetting all bookkeeping.
    pub fn reset(&mut self, tree: Tree) {
        self.tree = tree;
        self.open.clear();
        self.loading.clear();
        self.descendants.clear();
        self.generations.clear();
        self.active_descendants_root = None;
        self.selected = None;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tree: filter_by_visible_types(&self.tree, &self.visible_types, self.side),
            side: self.side,
            visible_types: self.visible_types,
            open: self.open.clone(),
            loading: self.loading.keys().copied().collect(),
            descendants: self.descendants.clone(),
            active_descendants_root: self.active_descendants_root,
            selected: self.selected,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::node::{Direction, GraphNode, NodeRef, NodeType, UiIdGenerator};
    use crate::tree::Tree;

    use super::ViewState;

    fn state_with_root(ids: &UiIdGenerator) -> (ViewState, GraphNode) {
        let root = GraphNode::structural(
            ids.next_id(),
            NodeRef::new("pc", "Org", NodeType::PolicyClass),
        );
        let mut state = ViewState::new(&Config::default());
        state.reset(Tree::new(vec![root.clone()]));
        (state, root)
    }

    #[test]
    fn one_fetch_per_node() {
        let ids = UiIdGenerator::new();
        let (mut state, root) = state_with_root(&ids);

        let ticket = state.begin(root.ui_id, Direction::Ascendant).unwrap();
        assert!(state.is_loading(root.ui_id));
        assert!(state.begin(root.ui_id, Direction::Ascendant).is_none());

        state.finish(&ticket);
        assert!(!state.is_loading(root.ui_id));
        assert!(state.begin(root.ui_id, Direction::Ascendant).is_some());
    }

    #[test]
    fn invalidated_ticket_is_stale_and_keeps_newer_loading_flag() {
        let ids = UiIdGenerator::new();
        let (mut state, root) = state_with_root(&ids);

        state.open.insert(root.ui_id, Direction::Ascendant);
        let first = state.begin(root.ui_id, Direction::Ascendant).unwrap();
        assert!(state.is_current(&first));

        // Collapse and expand again while the first fetch is still pending.
        state.open.remove(&root.ui_id);
        state.invalidate(root.ui_id);
        state.open.insert(root.ui_id, Direction::Ascendant);
        let second = state.begin(root.ui_id, Direction::Ascendant).unwrap();

        assert!(!state.is_current(&first));
        assert!(state.is_current(&second));

        // The first fetch completing must not release the second one's flag.
        state.finish(&first);
        assert!(state.is_loading(root.ui_id));
        state.finish(&second);
        assert!(!state.is_loading(root.ui_id));
    }

    #[test]
    fn direction_change_makes_ticket_stale() {
        let ids = UiIdGenerator::new();
        let (mut state, root) = state_with_root(&ids);

        state.open.insert(root.ui_id, Direction::Ascendant);
        let ticket = state.begin(root.ui_id, Direction::Ascendant).unwrap();
        state.open.insert(root.ui_id, Direction::Descendant);

        assert!(!state.is_current(&ticket));
    }

    #[test]
    fn prune_forgets_removed_nodes() {
        let ids = UiIdGenerator::new();
        let (mut state, root) = state_with_root(&ids);
        let child = GraphNode::structural(
            ids.next_id(),
            NodeRef::new("ua", "Staff", NodeType::UserAttribute),
        );
        let child_id = child.ui_id;

        state.tree = state.tree.replace_children(root.ui_id, vec![child]);
        state.descendants.insert(child_id);
        state.open.insert(child_id, Direction::Descendant);
        state.active_descendants_root = Some(child_id);
        state.selected = Some(child_id);

        state.tree = state.tree.clear(root.ui_id);
        state.prune();

        assert!(state.descendants.is_empty());
        assert!(state.open.is_empty());
        assert_eq!(state.active_descendants_root, None);
        assert_eq!(state.selected, None);
    }
}
