// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for mocking the remote graph service.
//!
//! `MockGraphService` keeps a small policy graph in memory. Assignment edges point from the
//! assigned node to its container, so the ascendants of a node are the nodes assigned to it and
//! its descendants are the containers it is assigned to. The accompanying `MockGraphHandle`
//! mutates the graph, injects failures, holds requests at a gate and counts calls.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, bail};
use petgraph::Direction as EdgeDirection;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, Semaphore};

use crate::node::{NodeId, NodeRef, NodeType};
use crate::service::{AdjacentPrivilege, AssociationRecord, GraphService};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Remote queries of the graph service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Query {
    Ascendants,
    Descendants,
    AssociationsWithSource,
    AssociationsWithTarget,
    Roots,
}

type RequestKey = (Query, Option<NodeId>);

#[derive(Debug, Error)]
pub enum MockServiceError {
    #[error("graph service unavailable")]
    Unavailable,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// Holds requests until released, lets tests interleave other calls with a pending fetch.
#[derive(Debug)]
pub struct Gate {
    arrived: Notify,
    released: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            arrived: Notify::new(),
            released: Semaphore::new(0),
        }
    }

    /// Wait until a request reached this gate.
    pub async fn arrived(&self) {
        self.arrived.notified().await
    }

    /// Let one waiting request continue.
    pub fn release(&self) {
        self.released.add_permits(1);
    }

    async fn pass(&self) {
        self.arrived.notify_one();
        if let Ok(permit) = self.released.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug, Default)]
struct MockGraphState {
    graph: DiGraph<NodeRef, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    roots: Vec<NodeId>,
    associations: Vec<AssociationRecord>,
    failing: HashSet<RequestKey>,
    gates: HashMap<RequestKey, Arc<Gate>>,
    calls: HashMap<RequestKey, usize>,
}

impl MockGraphState {
    fn index(&self, id: &NodeId) -> Result<NodeIndex, MockServiceError> {
        self.indices
            .get(id)
            .copied()
            .ok_or_else(|| MockServiceError::UnknownNode(id.clone()))
    }

    fn node(&self, id: &NodeId) -> Result<NodeRef, MockServiceError> {
        let index = self.index(id)?;
        Ok(self.graph[index].clone())
    }

    fn add_node(&mut self, node: NodeRef) {
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.indices.insert(id, index);
    }

    fn assign(&mut self, child: &NodeId, parent: &NodeId) -> Result<(), MockServiceError> {
        let child = self.index(child)?;
        let parent = self.index(parent)?;
        self.graph.update_edge(child, parent, ());
        Ok(())
    }

    fn deassign(&mut self, child: &NodeId, parent: &NodeId) -> Result<(), MockServiceError> {
        let child = self.index(child)?;
        let parent = self.index(parent)?;
        if let Some(edge) = self.graph.find_edge(child, parent) {
            self.graph.remove_edge(edge);
        }
        Ok(())
    }

    fn associate(
        &mut self,
        ua: &NodeId,
        target: &NodeId,
        rights: &[&str],
    ) -> Result<(), MockServiceError> {
        let record = AssociationRecord {
            ua: self.node(ua)?,
            target: self.node(target)?,
            access_rights: rights.iter().map(|right| right.to_string()).collect(),
        };
        self.associations
            .retain(|existing| !(existing.ua.id == *ua && existing.target.id == *target));
        self.associations.push(record);
        Ok(())
    }

    fn neighbours(
        &self,
        id: &NodeId,
        direction: EdgeDirection,
    ) -> Result<Vec<AdjacentPrivilege>, MockServiceError> {
        let index = self.index(id)?;
        Ok(self
            .graph
            .neighbors_directed(index, direction)
            .map(|neighbour| AdjacentPrivilege {
                node: self.graph[neighbour].clone(),
                access_rights: Vec::new(),
            })
            .collect())
    }
}

/// Builder for a mock graph, used to set up fixtures without awaiting.
#[derive(Debug, Default)]
pub struct MockGraphBuilder {
    state: MockGraphState,
    errors: Vec<MockServiceError>,
}

impl MockGraphBuilder {
    pub fn node(mut self, id: &str, name: &str, node_type: NodeType) -> Self {
        self.state.add_node(NodeRef::new(id, name, node_type));
        self
    }

    /// Assign `child` to `parent`.
    pub fn assign(mut self, child: &str, parent: &str) -> Self {
        if let Err(err) = self.state.assign(&child.into(), &parent.into()) {
            self.errors.push(err);
        }
        self
    }

    pub fn associate(mut self, ua: &str, target: &str, rights: &[&str]) -> Self {
        if let Err(err) = self.state.associate(&ua.into(), &target.into(), rights) {
            self.errors.push(err);
        }
        self
    }

    /// Add a node to the personal object system returned by the bootstrap query.
    pub fn root(mut self, id: &str) -> Self {
        self.state.roots.push(id.into());
        self
    }

    /// Finish the fixture.
    ///
    /// Panics if the fixture referenced unknown nodes.
    pub fn build(self) -> MockGraph {
        if let Some(err) = self.errors.first() {
            panic!("invalid mock graph fixture: {err}");
        }

        let state = Arc::new(Mutex::new(self.state));
        MockGraph {
            service: MockGraphService {
                state: state.clone(),
            },
            handle: MockGraphHandle { state },
        }
    }
}

/// Mock service together with its control handle.
#[derive(Debug)]
pub struct MockGraph {
    pub service: MockGraphService,
    pub handle: MockGraphHandle,
}

impl MockGraph {
    pub fn builder() -> MockGraphBuilder {
        MockGraphBuilder::default()
    }
}

#[derive(Clone, Debug)]
pub struct MockGraphService {
    state: Arc<Mutex<MockGraphState>>,
}

impl MockGraphService {
    async fn request<T, F>(&self, key: RequestKey, f: F) -> Result<T, MockServiceError>
    where
        F: FnOnce(&MockGraphState) -> Result<T, MockServiceError>,
    {
        let gate = {
            let mut state = self.state.lock().await;
            *state.calls.entry(key.clone()).or_default() += 1;
            state.gates.get(&key).cloned()
        };

        if let Some(gate) = gate {
            gate.pass().await;
        }

        let state = self.state.lock().await;
        if state.failing.contains(&key) {
            return Err(MockServiceError::Unavailable);
        }
        f(&state)
    }
}

impl GraphService for MockGraphService {
    type Error = MockServiceError;

    async fn get_adjacent_ascendants(
        &self,
        node: &NodeId,
    ) -> Result<Vec<AdjacentPrivilege>, Self::Error> {
        self.request((Query::Ascendants, Some(node.clone())), |state| {
            state.neighbours(node, EdgeDirection::Incoming)
        })
        .await
    }

    async fn get_adjacent_descendants(
        &self,
        node: &NodeId,
    ) -> Result<Vec<AdjacentPrivilege>, Self::Error> {
        self.request((Query::Descendants, Some(node.clone())), |state| {
            state.neighbours(node, EdgeDirection::Outgoing)
        })
        .await
    }

    async fn get_associations_with_source(
        &self,
        node: &NodeId,
    ) -> Result<Vec<AssociationRecord>, Self::Error> {
        self.request((Query::AssociationsWithSource, Some(node.clone())), |state| {
            Ok(state
                .associations
                .iter()
                .filter(|record| record.ua.id == *node)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_associations_with_target(
        &self,
        node: &NodeId,
    ) -> Result<Vec<AssociationRecord>, Self::Error> {
        self.request((Query::AssociationsWithTarget, Some(node.clone())), |state| {
            Ok(state
                .associations
                .iter()
                .filter(|record| record.target.id == *node)
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_root_nodes(&self) -> Result<Vec<NodeRef>, Self::Error> {
        self.request((Query::Roots, None), |state| {
            state.roots.iter().map(|id| state.node(id)).collect()
        })
        .await
    }
}

#[derive(Clone, Debug)]
pub struct MockGraphHandle {
    state: Arc<Mutex<MockGraphState>>,
}

impl MockGraphHandle {
    pub async fn add_node(&self, id: &str, name: &str, node_type: NodeType) {
        let mut state = self.state.lock().await;
        state.add_node(NodeRef::new(id, name, node_type));
    }

    pub async fn assign(&self, child: &str, parent: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.assign(&child.into(), &parent.into())?;
        Ok(())
    }

    pub async fn deassign(&self, child: &str, parent: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.deassign(&child.into(), &parent.into())?;
        Ok(())
    }

    pub async fn associate(&self, ua: &str, target: &str, rights: &[&str]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.associate(&ua.into(), &target.into(), rights)?;
        Ok(())
    }

    pub async fn dissociate(&self, ua: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let before = state.associations.len();
        state
            .associations
            .retain(|record| !(record.ua.id.as_str() == ua && record.target.id.as_str() == target));
        if state.associations.len() == before {
            bail!("no association between {ua} and {target}")
        }
        Ok(())
    }

    /// Let the given query fail for the given node until `recover` is called.
    pub async fn fail(&self, query: Query, node: &str) {
        let mut state = self.state.lock().await;
        state.failing.insert(key(query, node));
    }

    pub async fn recover(&self, query: Query, node: &str) {
        let mut state = self.state.lock().await;
        state.failing.remove(&key(query, node));
    }

    /// Hold all following requests of the given query for the given node at a gate.
    pub async fn hold(&self, query: Query, node: &str) -> Arc<Gate> {
        let mut state = self.state.lock().await;
        state
            .gates
            .entry(key(query, node))
            .or_insert_with(|| Arc::new(Gate::new()))
            .clone()
    }

    /// Stop gating requests. Requests already waiting still need to be released.
    pub async fn unhold(&self, query: Query, node: &str) {
        let mut state = self.state.lock().await;
        state.gates.remove(&key(query, node));
    }

    /// Number of requests issued so far for the given query and node.
    pub async fn calls(&self, query: Query, node: &str) -> usize {
        let state = self.state.lock().await;
        state.calls.get(&key(query, node)).copied().unwrap_or_default()
    }

    /// Number of requests issued so far for the given query, over all nodes.
    pub async fn total_calls(&self, query: Query) -> usize {
        let state = self.state.lock().await;
        state
            .calls
            .iter()
            .filter(|((q, _), _)| *q == query)
            .map(|(_, count)| count)
            .sum()
    }
}

fn key(query: Query, node: &str) -> RequestKey {
    match query {
        Query::Roots => (query, None),
        _ => (query, Some(node.into())),
    }
}
