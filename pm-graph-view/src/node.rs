// SPDX-License-Identifier: MIT OR Apache-2.0

//! Displayed graph nodes and the ordering rule applied to every child list.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rights::AccessRightSet;

/// Types of nodes in a policy graph.
///
/// The declaration order is the display rank used when sorting children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    PolicyClass,
    UserAttribute,
    ObjectAttribute,
    User,
    Object,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::PolicyClass,
        NodeType::UserAttribute,
        NodeType::ObjectAttribute,
        NodeType::User,
        NodeType::Object,
    ];

    /// Fixed display rank, lower ranks are listed first.
    pub fn rank(&self) -> u8 {
        match self {
            NodeType::PolicyClass => 0,
            NodeType::UserAttribute => 1,
            NodeType::ObjectAttribute => 2,
            NodeType::User => 3,
            NodeType::Object => 4,
        }
    }

    /// Return `true` if nodes of this type can have other nodes assigned to them.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeType::PolicyClass | NodeType::UserAttribute | NodeType::ObjectAttribute
        )
    }

    /// Return `true` for the object side of the graph (objects and object attributes).
    pub fn is_object_like(&self) -> bool {
        matches!(self, NodeType::Object | NodeType::ObjectAttribute)
    }

    /// Short code used by the remote service ("PC", "UA", "OA", "U", "O").
    pub fn code(&self) -> &'static str {
        match self {
            NodeType::PolicyClass => "PC",
            NodeType::UserAttribute => "UA",
            NodeType::ObjectAttribute => "OA",
            NodeType::User => "U",
            NodeType::Object => "O",
        }
    }

    fn bit(&self) -> u8 {
        1 << self.rank()
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for NodeType {
    type Err = NodeTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PC" | "PolicyClass" => Ok(NodeType::PolicyClass),
            "UA" | "UserAttribute" => Ok(NodeType::UserAttribute),
            "OA" | "ObjectAttribute" => Ok(NodeType::ObjectAttribute),
            "U" | "User" => Ok(NodeType::User),
            "O" | "Object" => Ok(NodeType::Object),
            _ => Err(NodeTypeError::Unknown(value.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeTypeError {
    #[error("unknown node type \"{0}\"")]
    Unknown(String),
}

/// Set of node types, used for fetch filters and the visibility filter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<NodeType>", into = "Vec<NodeType>")]
pub struct NodeTypeSet(u8);

impl NodeTypeSet {
    pub fn all() -> Self {
        NodeType::ALL.into_iter().collect()
    }

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.0 & node_type.bit() != 0
    }

    pub fn insert(&mut self, node_type: NodeType) {
        self.0 |= node_type.bit();
    }

    pub fn remove(&mut self, node_type: NodeType) {
        self.0 &= !node_type.bit();
    }

    pub fn with(mut self, node_type: NodeType) -> Self {
        self.insert(node_type);
        self
    }

    pub fn without(mut self, node_type: NodeType) -> Self {
        self.remove(node_type);
        self
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeType> + '_ {
        NodeType::ALL
            .into_iter()
            .filter(|node_type| self.contains(*node_type))
    }
}

impl Default for NodeTypeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl std::fmt::Debug for NodeTypeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<NodeType> for NodeTypeSet {
    fn from_iter<T: IntoIterator<Item = NodeType>>(iter: T) -> Self {
        let mut set = Self::empty();
        for node_type in iter {
            set.insert(node_type);
        }
        set
    }
}

impl From<Vec<NodeType>> for NodeTypeSet {
    fn from(value: Vec<NodeType>) -> Self {
        value.into_iter().collect()
    }
}

impl From<NodeTypeSet> for Vec<NodeType> {
    fn from(value: NodeTypeSet) -> Self {
        value.iter().collect()
    }
}

/// Identifier of an entity in the remote policy graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a row in one displayed tree.
///
/// A remote node can be displayed at many positions, each with its own `UiId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UiId(u64);

impl Display for UiId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ui-{}", self.0)
    }
}

/// Allocates `UiId`s which are unique for the lifetime of the generator.
#[derive(Debug)]
pub struct UiIdGenerator(AtomicU64);

impl UiIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next_id(&self) -> UiId {
        UiId(self.0.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl Default for UiIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of a remote graph node as returned by the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl NodeRef {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Which side of an association a tree is displaying.
///
/// On the source side (user attributes) associations are shown by their target, on the target
/// side (object attributes) they are shown by their grantor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeSide {
    #[default]
    Source,
    Target,
}

/// Traversal direction used when fetching the children of a node.
///
/// Maps onto the remote "adjacent ascendant privileges" and "adjacent descendant privileges"
/// queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascendant,
    Descendant,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Direction::Ascendant => "ascendant",
            Direction::Descendant => "descendant",
        };

        write!(f, "{}", s)
    }
}

/// Association edge overlaid as a pseudo-node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationOverlay {
    /// User attribute granting the rights.
    pub grantor: NodeRef,

    /// Attribute the rights are granted on.
    pub target: NodeRef,

    pub rights: AccessRightSet,
}

impl AssociationOverlay {
    /// Formatted right set, for example "read, write".
    pub fn label(&self) -> String {
        self.rights.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Structural,
    Association(AssociationOverlay),
}

/// Pre-fetched next level of a node, only used to decide its expand affordance.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Lookahead {
    /// Never checked.
    #[default]
    Unchecked,

    /// Checked in the given direction. An empty list means "checked, found none".
    Checked {
        direction: Direction,
        nodes: Arc<[GraphNode]>,
    },
}

impl Lookahead {
    pub fn checked(direction: Direction, nodes: Vec<GraphNode>) -> Self {
        Lookahead::Checked {
            direction,
            nodes: nodes.into(),
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, Lookahead::Checked { .. })
    }

    pub fn nodes(&self) -> Option<&[GraphNode]> {
        match self {
            Lookahead::Unchecked => None,
            Lookahead::Checked { nodes, .. } => Some(nodes),
        }
    }
}

/// What the presentation layer renders next to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Affordance {
    Expandable,
    Leaf,
}

/// A node as displayed in one tree.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub ui_id: UiId,

    /// Displayed remote entity. For association pseudo-nodes this is the opposite endpoint.
    pub node: NodeRef,

    pub kind: NodeKind,

    /// `None` until the node was expanded, `Some(vec![])` when expanded and found empty.
    pub children: Option<Vec<Arc<GraphNode>>>,

    pub lookahead: Lookahead,
}

impl GraphNode {
    pub fn structural(ui_id: UiId, node: NodeRef) -> Self {
        Self {
            ui_id,
            node,
            kind: NodeKind::Structural,
            children: None,
            lookahead: Lookahead::Unchecked,
        }
    }

    /// Create an association pseudo-node displaying the endpoint facing away from `side`.
    pub fn association(ui_id: UiId, overlay: AssociationOverlay, side: TreeSide) -> Self {
        let node = match side {
            TreeSide::Source => overlay.target.clone(),
            TreeSide::Target => overlay.grantor.clone(),
        };

        Self {
            ui_id,
            node,
            kind: NodeKind::Association(overlay),
            children: None,
            lookahead: Lookahead::Unchecked,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node.id
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn node_type(&self) -> NodeType {
        self.node.node_type
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, NodeKind::Association(_))
    }

    /// Association edge shown by this node, `None` for structural nodes.
    pub fn overlay(&self) -> Option<&AssociationOverlay> {
        match &self.kind {
            NodeKind::Association(overlay) => Some(overlay),
            NodeKind::Structural => None,
        }
    }

    pub fn children(&self) -> Option<&[Arc<GraphNode>]> {
        self.children.as_deref()
    }

    /// Remote id used when fetching this node's children.
    ///
    /// On the source side an association pseudo-node stands in for its target.
    pub fn expansion_id(&self, side: TreeSide) -> &NodeId {
        match (&self.kind, side) {
            (NodeKind::Association(overlay), TreeSide::Source) => &overlay.target.id,
            _ => &self.node.id,
        }
    }

    /// Expand affordance derived from the lookahead cache.
    ///
    /// Nodes which were never checked fall back to their type: containers can have children.
    pub fn affordance(&self) -> Affordance {
        match self.lookahead.nodes() {
            Some(nodes) if !nodes.is_empty() => Affordance::Expandable,
            Some(_) => Affordance::Leaf,
            None if self.node_type().is_container() => Affordance::Expandable,
            None => Affordance::Leaf,
        }
    }

    /// Compare displayed content recursively, ignoring `UiId`s and lookahead.
    pub fn content_eq(&self, other: &GraphNode) -> bool {
        if self.node != other.node || self.kind != other.kind {
            return false;
        }

        match (&self.children, &other.children) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.content_eq(b))
            }
            _ => false,
        }
    }
}

impl AsRef<GraphNode> for GraphNode {
    fn as_ref(&self) -> &GraphNode {
        self
    }
}

/// Total order over displayed nodes: type rank, then name (case-sensitive), then remote id.
/// Structural nodes precede association pseudo-nodes displaying the same entity.
pub fn compare_nodes(a: &GraphNode, b: &GraphNode) -> Ordering {
    a.node_type()
        .rank()
        .cmp(&b.node_type().rank())
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.node_id().cmp(b.node_id()))
        .then_with(|| a.is_association().cmp(&b.is_association()))
}

/// Return a sorted copy of the given child list.
pub fn sort_children<N>(nodes: &[N]) -> Vec<N>
where
    N: AsRef<GraphNode> + Clone,
{
    let mut sorted = nodes.to_vec();
    sorted.sort_by(|a, b| compare_nodes(a.as_ref(), b.as_ref()));
    sorted
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn structural(ids: &UiIdGenerator, id: &str, name: &str, node_type: NodeType) -> GraphNode {
        GraphNode::structural(ids.next_id(), NodeRef::new(id, name, node_type))
    }

    #[test]
    fn type_rank_before_name() {
        let ids = UiIdGenerator::new();
        let nodes = vec![
            structural(&ids, "o1", "aaa", NodeType::Object),
            structural(&ids, "u1", "aaa", NodeType::User),
            structural(&ids, "oa1", "Files", NodeType::ObjectAttribute),
            structural(&ids, "ua2", "Billing", NodeType::UserAttribute),
            structural(&ids, "ua1", "Admin", NodeType::UserAttribute),
            structural(&ids, "pc1", "zzz", NodeType::PolicyClass),
        ];

        let names: Vec<_> = sort_children(&nodes)
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        assert_eq!(names, vec!["zzz", "Admin", "Billing", "Files", "aaa", "aaa"]);
    }

    #[test]
    fn names_are_case_sensitive() {
        let ids = UiIdGenerator::new();
        let nodes = vec![
            structural(&ids, "1", "beta", NodeType::Object),
            structural(&ids, "2", "Beta", NodeType::Object),
            structural(&ids, "3", "alpha", NodeType::Object),
        ];

        let names: Vec<_> = sort_children(&nodes)
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        assert_eq!(names, vec!["Beta", "alpha", "beta"]);
    }

    #[test]
    fn associations_interleave_by_displayed_type() {
        let ids = UiIdGenerator::new();
        let overlay = AssociationOverlay {
            grantor: NodeRef::new("ua1", "Admin", NodeType::UserAttribute),
            target: NodeRef::new("oa1", "Reports", NodeType::ObjectAttribute),
            rights: ["read"].into_iter().collect(),
        };
        let nodes = vec![
            structural(&ids, "u1", "alice", NodeType::User),
            GraphNode::association(ids.next_id(), overlay.clone(), TreeSide::Source),
            structural(&ids, "ua2", "Staff", NodeType::UserAttribute),
        ];

        let sorted = sort_children(&nodes);
        assert_eq!(sorted[0].name(), "Staff");
        assert_eq!(sorted[1].name(), "Reports");
        assert!(sorted[1].is_association());
        assert_eq!(sorted[2].name(), "alice");

        // On the target side the same association is displayed by its grantor.
        let target_side = GraphNode::association(ids.next_id(), overlay, TreeSide::Target);
        assert_eq!(target_side.name(), "Admin");
        assert_eq!(target_side.node_type(), NodeType::UserAttribute);
    }

    #[test]
    fn sort_does_not_mutate_input() {
        let ids = UiIdGenerator::new();
        let nodes = vec![
            structural(&ids, "2", "b", NodeType::User),
            structural(&ids, "1", "a", NodeType::User),
        ];
        let before = nodes.clone();

        let sorted = sort_children(&nodes);
        assert_eq!(nodes, before);
        assert_eq!(sorted[0].name(), "a");
        assert_eq!(sort_children(&sorted), sorted);
    }

    #[rstest]
    #[case(NodeType::PolicyClass, Affordance::Expandable)]
    #[case(NodeType::UserAttribute, Affordance::Expandable)]
    #[case(NodeType::ObjectAttribute, Affordance::Expandable)]
    #[case(NodeType::User, Affordance::Leaf)]
    #[case(NodeType::Object, Affordance::Leaf)]
    fn unchecked_affordance_follows_type(
        #[case] node_type: NodeType,
        #[case] expected: Affordance,
    ) {
        let ids = UiIdGenerator::new();
        let node = structural(&ids, "x", "x", node_type);
        assert_eq!(node.affordance(), expected);
    }

    #[test]
    fn checked_lookahead_decides_affordance() {
        let ids = UiIdGenerator::new();
        let child = structural(&ids, "u1", "alice", NodeType::User);

        let mut container = structural(&ids, "ua1", "Staff", NodeType::UserAttribute);
        container.lookahead = Lookahead::checked(Direction::Ascendant, vec![]);
        assert_eq!(container.affordance(), Affordance::Leaf);

        let mut user = structural(&ids, "u2", "bob", NodeType::User);
        user.lookahead = Lookahead::checked(Direction::Descendant, vec![child]);
        assert_eq!(user.affordance(), Affordance::Expandable);
    }

    #[test]
    fn association_expands_as_target_on_source_side() {
        let ids = UiIdGenerator::new();
        let overlay = AssociationOverlay {
            grantor: NodeRef::new("ua1", "Admin", NodeType::UserAttribute),
            target: NodeRef::new("oa1", "Reports", NodeType::ObjectAttribute),
            rights: AccessRightSet::default(),
        };

        let source = GraphNode::association(ids.next_id(), overlay.clone(), TreeSide::Source);
        assert_eq!(source.expansion_id(TreeSide::Source).as_str(), "oa1");

        let target = GraphNode::association(ids.next_id(), overlay, TreeSide::Target);
        assert_eq!(target.expansion_id(TreeSide::Target).as_str(), "ua1");
    }

    #[test]
    fn type_set_operations() {
        let users = NodeTypeSet::empty()
            .with(NodeType::User)
            .with(NodeType::UserAttribute);
        let objects = NodeTypeSet::all()
            .without(NodeType::User)
            .without(NodeType::UserAttribute);

        assert!(users.intersection(&objects).is_empty());
        assert_eq!(users.union(&objects), NodeTypeSet::all());
        assert_eq!(
            users.iter().collect::<Vec<_>>(),
            vec![NodeType::UserAttribute, NodeType::User]
        );
    }

    #[test]
    fn node_type_codes() {
        for node_type in NodeType::ALL {
            assert_eq!(NodeType::from_str(node_type.code()).unwrap(), node_type);
        }
        assert!(NodeType::from_str("Group").is_err());
    }
}
