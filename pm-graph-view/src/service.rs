// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NodeRef};

/// Node adjacent to a queried node, together with the caller's privileges on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacentPrivilege {
    pub node: NodeRef,
    #[serde(default)]
    pub access_rights: Vec<String>,
}

/// Association edge between a user attribute and a target attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub ua: NodeRef,
    pub target: NodeRef,
    pub access_rights: Vec<String>,
}

/// Remote policy graph service.
///
/// Implementations wrap the RPC transport. Every call may be slow or fail; the view treats any
/// error as a failed fetch and never retries on its own.
pub trait GraphService: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    /// Nodes returned by the "adjacent ascendant privileges" query for the given node.
    fn get_adjacent_ascendants(
        &self,
        node: &NodeId,
    ) -> impl Future<Output = Result<Vec<AdjacentPrivilege>, Self::Error>> + Send;

    /// Nodes returned by the "adjacent descendant privileges" query for the given node.
    fn get_adjacent_descendants(
        &self,
        node: &NodeId,
    ) -> impl Future<Output = Result<Vec<AdjacentPrivilege>, Self::Error>> + Send;

    /// Associations granted by the given user attribute.
    fn get_associations_with_source(
        &self,
        node: &NodeId,
    ) -> impl Future<Output = Result<Vec<AssociationRecord>, Self::Error>> + Send;

    /// Associations granting rights on the given attribute.
    fn get_associations_with_target(
        &self,
        node: &NodeId,
    ) -> impl Future<Output = Result<Vec<AssociationRecord>, Self::Error>> + Send;

    /// Bootstrap nodes of the caller's personal object system.
    fn get_root_nodes(&self) -> impl Future<Output = Result<Vec<NodeRef>, Self::Error>> + Send;
}
