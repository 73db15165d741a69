// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazily materialized tree view over a remote Policy Machine graph.
//!
//! The authorization graph (policy classes, attributes, users, objects and associations between
//! them) lives behind a [`GraphService`]. A [`GraphViewController`] shows it as an expandable
//! tree: nodes are fetched one level at a time when expanded, one extra level is prefetched to
//! decide whether a node offers an expand control, and association edges are overlaid as
//! pseudo-nodes next to the structural children.
//!
//! The same remote node may appear at many positions, every position has its own [`UiId`].
//! State is published as immutable [`Snapshot`] values which can be rendered without further
//! synchronization.
mod config;
mod controller;
pub mod fetcher;
pub mod filter;
pub mod lookahead;
mod node;
mod rights;
mod service;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod tree;

pub use config::Config;
pub use controller::{ControllerError, GraphViewController, Snapshot};
pub use fetcher::{AdjacencyFetcher, FetchError};
pub use node::{
    Affordance, AssociationOverlay, Direction, GraphNode, Lookahead, NodeId, NodeKind, NodeRef,
    NodeType, NodeTypeError, NodeTypeSet, TreeSide, UiId, UiIdGenerator, compare_nodes,
    sort_children,
};
pub use rights::AccessRightSet;
pub use service::{AdjacentPrivilege, AssociationRecord, GraphService};
pub use tree::Tree;
