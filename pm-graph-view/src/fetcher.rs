// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;
use std::sync::Arc;

use futures_util::future::join;
use thiserror::Error;
use tracing::{trace, warn};

use crate::node::{
    AssociationOverlay, Direction, GraphNode, NodeId, NodeType, NodeTypeSet, TreeSide,
    UiIdGenerator, sort_children,
};
use crate::service::{AdjacentPrivilege, AssociationRecord, GraphService};

/// Children of a node, split by relation.
#[derive(Clone, Debug, Default)]
pub struct Adjacent {
    /// Nodes connected by assignment edges, already filtered by type.
    pub structural: Vec<GraphNode>,

    /// Association pseudo-nodes.
    pub associations: Vec<GraphNode>,
}

impl Adjacent {
    /// Merge both relations into one sorted child list.
    pub fn merged(self) -> Vec<GraphNode> {
        let mut nodes = self.structural;
        nodes.extend(self.associations);
        sort_children(&nodes)
    }
}

/// Uniform "children in direction D of node N" over the remote graph service.
#[derive(Debug)]
pub struct AdjacencyFetcher<S> {
    service: Arc<S>,
    side: TreeSide,
    ids: Arc<UiIdGenerator>,
}

impl<S> AdjacencyFetcher<S>
where
    S: GraphService,
{
    pub fn new(service: Arc<S>, side: TreeSide, ids: Arc<UiIdGenerator>) -> Self {
        Self { service, side, ids }
    }

    pub fn side(&self) -> TreeSide {
        self.side
    }

    /// Fetch the structural children and association overlay of a node.
    ///
    /// A failing association query degrades to an empty overlay. A failing structural query is
    /// returned as an error.
    pub async fn fetch_adjacent(
        &self,
        node: &GraphNode,
        direction: Direction,
        allowed: &NodeTypeSet,
    ) -> Result<Adjacent, FetchError<S::Error>> {
        let node_id = node.expansion_id(self.side).clone();
        let allowed = self.effective_types(node, allowed);

        let structural = self.structural(&node_id, direction);
        let associations = async {
            // Associations do not have associations themselves.
            if node.is_association() {
                Vec::new()
            } else {
                self.associations(&node_id).await
            }
        };
        let (structural, associations) = join(structural, associations).await;

        let structural = structural
            .map_err(|source| FetchError::Structural {
                node: node_id.clone(),
                direction,
                source,
            })?
            .into_iter()
            .filter(|privilege| allowed.contains(privilege.node.node_type))
            .map(|privilege| GraphNode::structural(self.ids.next_id(), privilege.node))
            .collect::<Vec<_>>();

        trace!(
            node_id = %node_id,
            %direction,
            structural = structural.len(),
            associations = associations.len(),
            "fetched adjacent nodes"
        );

        Ok(Adjacent {
            structural,
            associations,
        })
    }

    /// Fetch the merged and sorted child list of a node.
    pub async fn fetch_children(
        &self,
        node: &GraphNode,
        direction: Direction,
        allowed: &NodeTypeSet,
    ) -> Result<Vec<GraphNode>, FetchError<S::Error>> {
        self.fetch_adjacent(node, direction, allowed)
            .await
            .map(Adjacent::merged)
    }

    /// Fetch the bootstrap nodes of the personal object system.
    pub async fn fetch_roots(
        &self,
        allowed: &NodeTypeSet,
    ) -> Result<Vec<GraphNode>, FetchError<S::Error>> {
        let roots = self
            .service
            .get_root_nodes()
            .await
            .map_err(FetchError::Roots)?
            .into_iter()
            .filter(|node| allowed.contains(node.node_type))
            .map(|node| GraphNode::structural(self.ids.next_id(), node))
            .collect::<Vec<_>>();

        Ok(sort_children(&roots))
    }

    /// Expanding an association on the source side reveals its target's own subtree, so objects
    /// and object attributes are let through even when excluded.
    fn effective_types(&self, node: &GraphNode, allowed: &NodeTypeSet) -> NodeTypeSet {
        if node.is_association() && self.side == TreeSide::Source {
            allowed
                .with(NodeType::Object)
                .with(NodeType::ObjectAttribute)
        } else {
            *allowed
        }
    }

    async fn structural(
        &self,
        node_id: &NodeId,
        direction: Direction,
    ) -> Result<Vec<AdjacentPrivilege>, S::Error> {
        match direction {
            Direction::Ascendant => self.service.get_adjacent_ascendants(node_id).await,
            Direction::Descendant => self.service.get_adjacent_descendants(node_id).await,
        }
    }

    async fn associations(&self, node_id: &NodeId) -> Vec<GraphNode> {
        let result = match self.side {
            TreeSide::Source => self.service.get_associations_with_source(node_id).await,
            TreeSide::Target => self.service.get_associations_with_target(node_id).await,
        };

        match result {
            Ok(records) => records
                .into_iter()
                .map(|record| self.overlay(record))
                .collect(),
            Err(err) => {
                warn!(node_id = %node_id, "fetching associations failed: {err}");
                Vec::new()
            }
        }
    }

    fn overlay(&self, record: AssociationRecord) -> GraphNode {
        let overlay = AssociationOverlay {
            grantor: record.ua,
            target: record.target,
            rights: record.access_rights.into(),
        };

        GraphNode::association(self.ids.next_id(), overlay, self.side)
    }
}

#[derive(Debug, Error)]
pub enum FetchError<E>
where
    E: Error + 'static,
{
    #[error("fetching {direction} nodes of {node} failed: {source}")]
    Structural {
        node: NodeId,
        direction: Direction,
        source: E,
    },

    #[error("fetching root nodes failed: {0}")]
    Roots(#[source] E),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::node::{
        Direction, GraphNode, NodeRef, NodeType, NodeTypeSet, TreeSide, UiIdGenerator,
    };
    use crate::test_utils::{MockGraph, MockGraphService, Query};

    use super::{AdjacencyFetcher, FetchError};

    fn fixture() -> MockGraph {
        MockGraph::builder()
            .node("pc", "Org", NodeType::PolicyClass)
            .node("ua-staff", "Staff", NodeType::UserAttribute)
            .node("ua-admin", "Admin", NodeType::UserAttribute)
            .node("u-alice", "alice", NodeType::User)
            .node("oa-reports", "Reports", NodeType::ObjectAttribute)
            .node("o-q1", "q1.pdf", NodeType::Object)
            .assign("ua-staff", "pc")
            .assign("ua-admin", "ua-staff")
            .assign("u-alice", "ua-staff")
            .assign("oa-reports", "pc")
            .assign("o-q1", "oa-reports")
            .associate("ua-staff", "oa-reports", &["read", "write"])
            .root("pc")
            .build()
    }

    fn fetcher(graph: &MockGraph, side: TreeSide) -> AdjacencyFetcher<MockGraphService> {
        AdjacencyFetcher::new(
            Arc::new(graph.service.clone()),
            side,
            Arc::new(UiIdGenerator::new()),
        )
    }

    fn staff(ids: &UiIdGenerator) -> GraphNode {
        GraphNode::structural(
            ids.next_id(),
            NodeRef::new("ua-staff", "Staff", NodeType::UserAttribute),
        )
    }

    #[tokio::test]
    async fn structural_and_association_children() {
        let graph = fixture();
        let fetcher = fetcher(&graph, TreeSide::Source);
        let ids = UiIdGenerator::new();

        let adjacent = fetcher
            .fetch_adjacent(&staff(&ids), Direction::Ascendant, &NodeTypeSet::all())
            .await
            .unwrap();

        let names: Vec<_> = adjacent.structural.iter().map(|n| n.name()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Admin"));
        assert!(names.contains(&"alice"));

        assert_eq!(adjacent.associations.len(), 1);
        let association = &adjacent.associations[0];
        assert_eq!(association.name(), "Reports");
        let overlay = association.overlay().unwrap();
        assert_eq!(overlay.grantor.name, "Staff");
        assert_eq!(overlay.label(), "read, write");

        let merged = adjacent.merged();
        let names: Vec<_> = merged.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["Admin", "Reports", "alice"]);
    }

    #[tokio::test]
    async fn structural_results_are_filtered_by_type() {
        let graph = fixture();
        let fetcher = fetcher(&graph, TreeSide::Source);
        let ids = UiIdGenerator::new();

        let allowed = NodeTypeSet::all().without(NodeType::User);
        let children = fetcher
            .fetch_children(&staff(&ids), Direction::Ascendant, &allowed)
            .await
            .unwrap();

        let names: Vec<_> = children.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["Admin", "Reports"]);
    }

    #[tokio::test]
    async fn association_reveals_target_objects_on_source_side() {
        let graph = fixture();
        let fetcher = fetcher(&graph, TreeSide::Source);
        let ids = UiIdGenerator::new();

        let allowed = NodeTypeSet::empty()
            .with(NodeType::UserAttribute)
            .with(NodeType::User);
        let associations = fetcher
            .fetch_adjacent(&staff(&ids), Direction::Ascendant, &allowed)
            .await
            .unwrap()
            .associations;
        let association = &associations[0];

        let children = fetcher
            .fetch_children(association, Direction::Ascendant, &allowed)
            .await
            .unwrap();

        // Expanded as the target attribute, objects are allowed through.
        let names: Vec<_> = children.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["q1.pdf"]);
        assert_eq!(graph.handle.calls(Query::Ascendants, "oa-reports").await, 1);

        // Associations are never fetched for an association pseudo-node.
        assert_eq!(
            graph
                .handle
                .calls(Query::AssociationsWithSource, "oa-reports")
                .await,
            0
        );
    }

    #[tokio::test]
    async fn target_side_overlays_show_grantor() {
        let graph = fixture();
        let fetcher = fetcher(&graph, TreeSide::Target);
        let ids = UiIdGenerator::new();
        let reports = GraphNode::structural(
            ids.next_id(),
            NodeRef::new("oa-reports", "Reports", NodeType::ObjectAttribute),
        );

        let adjacent = fetcher
            .fetch_adjacent(&reports, Direction::Ascendant, &NodeTypeSet::all())
            .await
            .unwrap();

        assert_eq!(adjacent.associations.len(), 1);
        assert_eq!(adjacent.associations[0].name(), "Staff");
        assert_eq!(
            adjacent.associations[0].node_type(),
            NodeType::UserAttribute
        );
        assert_eq!(
            graph
                .handle
                .calls(Query::AssociationsWithTarget, "oa-reports")
                .await,
            1
        );
    }

    #[tokio::test]
    async fn failed_association_query_degrades_to_no_overlay() {
        let graph = fixture();
        graph
            .handle
            .fail(Query::AssociationsWithSource, "ua-staff")
            .await;
        let fetcher = fetcher(&graph, TreeSide::Source);
        let ids = UiIdGenerator::new();

        let adjacent = fetcher
            .fetch_adjacent(&staff(&ids), Direction::Ascendant, &NodeTypeSet::all())
            .await
            .unwrap();

        assert_eq!(adjacent.structural.len(), 2);
        assert!(adjacent.associations.is_empty());
    }

    #[tokio::test]
    async fn failed_structural_query_is_an_error() {
        let graph = fixture();
        graph.handle.fail(Query::Descendants, "ua-staff").await;
        let fetcher = fetcher(&graph, TreeSide::Source);
        let ids = UiIdGenerator::new();

        let result = fetcher
            .fetch_adjacent(&staff(&ids), Direction::Descendant, &NodeTypeSet::all())
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Structural {
                direction: Direction::Descendant,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn roots_are_sorted_and_filtered() {
        let graph = MockGraph::builder()
            .node("pc-b", "B", NodeType::PolicyClass)
            .node("pc-a", "A", NodeType::PolicyClass)
            .node("o", "loose", NodeType::Object)
            .root("pc-b")
            .root("pc-a")
            .root("o")
            .build();
        let fetcher = fetcher(&graph, TreeSide::Source);

        let roots = fetcher
            .fetch_roots(&NodeTypeSet::all().without(NodeType::Object))
            .await
            .unwrap();

        let names: Vec<_> = roots.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
