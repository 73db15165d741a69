// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::config::Config;
use crate::fetcher::{AdjacencyFetcher, FetchError};
use crate::lookahead::{LookaheadBuilder, LookaheadIndex};
use crate::node::{Direction, GraphNode, Lookahead, NodeId, NodeTypeSet, UiId, UiIdGenerator};
use crate::service::GraphService;
use crate::tree::Tree;

use super::snapshot::{Snapshot, offers_descendant_toggle};
use super::state::{Ticket, ViewState};

/// Owns the state of one displayed graph tree.
///
/// All operations return the snapshot after the operation completed, every state change is also
/// published to subscribers. Requests for different nodes run independently; a second request
/// for a node which is still loading is ignored. Results of requests which were overtaken by a
/// collapse, a direction change or a reset are discarded.
pub struct GraphViewController<S>
where
    S: GraphService,
{
    inner: Arc<Inner<S>>,
}

struct Inner<S>
where
    S: GraphService,
{
    fetcher: AdjacencyFetcher<S>,
    config: Config,
    state: RwLock<ViewState>,
    snapshots: watch::Sender<Snapshot>,
}

impl<S> Clone for GraphViewController<S>
where
    S: GraphService,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// What to do with fetched children.
#[derive(Clone, Copy, Debug)]
enum Apply {
    /// Replace the node's children.
    Children {
        /// Mark the new children as displayed in descendant mode.
        mark: bool,

        /// Make the node the active descendants root.
        activate: bool,
    },

    /// Only update the node's lookahead, it stays closed.
    Lookahead,
}

struct Request {
    ticket: Ticket,
    node: GraphNode,
    index: LookaheadIndex,
    apply: Apply,

    /// Open state restored when the fetch fails.
    previous_open: Option<Direction>,
}

impl<S> GraphViewController<S>
where
    S: GraphService,
{
    pub fn new(service: impl Into<Arc<S>>, config: Config) -> Self {
        let ids = Arc::new(UiIdGenerator::new());
        let fetcher = AdjacencyFetcher::new(service.into(), config.side, ids);
        let state = ViewState::new(&config);
        let (snapshots, _) = watch::channel(state.snapshot());

        let inner = Inner {
            fetcher,
            config,
            state: RwLock::new(state),
            snapshots,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.state.read().await.snapshot()
    }

    /// Unfiltered tree including nodes hidden by the visibility filter.
    pub async fn tree(&self) -> Tree {
        self.inner.state.read().await.tree.clone()
    }

    /// Replace the whole tree with the bootstrap nodes of the personal object system.
    pub async fn load_roots(&self) -> Result<Snapshot, ControllerError<S::Error>> {
        let allowed = &self.inner.config.allowed_types;

        let roots = match self.inner.fetcher.fetch_roots(allowed).await {
            Ok(roots) => roots,
            Err(err) => {
                warn!("loading root nodes failed: {err}");
                return Err(err.into());
            }
        };

        let roots = if self.inner.config.prefetch_lookahead {
            LookaheadBuilder::new(&self.inner.fetcher)
                .build(roots, Direction::Ascendant, allowed, &LookaheadIndex::new())
                .await
        } else {
            roots
        };

        let mut state = self.inner.state.write().await;
        state.reset(Tree::new(roots));
        debug!(roots = state.tree.roots().len(), "loaded root nodes");
        Ok(self.publish(&state))
    }

    /// Fetch and show the children of a node.
    ///
    /// Nodes displayed in descendant mode continue in descendant direction, all others expand
    /// in ascendant direction.
    pub async fn expand(&self, ui_id: UiId) -> Result<Snapshot, ControllerError<S::Error>> {
        let request = {
            let mut state = self.inner.state.write().await;

            let Some(node) = state.node(ui_id).cloned() else {
                debug!(%ui_id, "ignoring expand of unknown node");
                return Ok(state.snapshot());
            };

            if state.open.contains_key(&ui_id) || state.is_loading(ui_id) {
                debug!(%ui_id, "ignoring expand of open or loading node");
                return Ok(state.snapshot());
            }

            let direction = if state.descendants.contains(&ui_id) {
                Direction::Descendant
            } else {
                Direction::Ascendant
            };

            state.open.insert(ui_id, direction);
            let apply = Apply::Children {
                mark: direction == Direction::Descendant,
                activate: false,
            };

            match self.prepare(&mut state, node, direction, apply, None) {
                Some(request) => request,
                None => return Ok(state.snapshot()),
            }
        };

        self.execute(request).await
    }

    /// Hide the children of a node.
    ///
    /// Descendant markings below the node are removed together with the children. A fetch
    /// still pending for the node is discarded when it completes.
    pub async fn collapse(&self, ui_id: UiId) -> Snapshot {
        let mut state = self.inner.state.write().await;

        if !state.tree.contains(ui_id) {
            debug!(%ui_id, "ignoring collapse of unknown node");
            return state.snapshot();
        }

        let clears_root = state
            .active_descendants_root
            .is_some_and(|root| state.is_within(root, ui_id));
        if clears_root {
            state.active_descendants_root = None;
        }

        state.unmark_subtree(ui_id);
        state.open.remove(&ui_id);
        state.invalidate(ui_id);
        state.tree = state.tree.clear(ui_id);
        state.prune();

        self.publish(&state)
    }

    /// Switch the children of a node between ascendant and descendant direction.
    ///
    /// If any child is currently displayed in descendant mode, all markings below the node are
    /// removed and the children are fetched again in ascendant direction. Otherwise the node is
    /// opened in descendant direction, its children are marked and it becomes the active
    /// descendants root.
    pub async fn toggle_descendants(
        &self,
        ui_id: UiId,
    ) -> Result<Snapshot, ControllerError<S::Error>> {
        let request = {
            let mut state = self.inner.state.write().await;

            let Some(node) = state.node(ui_id).cloned() else {
                debug!(%ui_id, "ignoring descendants toggle of unknown node");
                return Ok(state.snapshot());
            };

            if !offers_descendant_toggle(&node) {
                return Err(ControllerError::DescendantsUnsupported(ui_id));
            }

            if state.is_loading(ui_id) {
                debug!(%ui_id, "ignoring descendants toggle of loading node");
                return Ok(state.snapshot());
            }

            let showing_descendants = node.children().is_some_and(|children| {
                children
                    .iter()
                    .any(|child| state.descendants.contains(&child.ui_id))
            });

            let (direction, apply) = if showing_descendants {
                (
                    Direction::Ascendant,
                    Apply::Children {
                        mark: false,
                        activate: false,
                    },
                )
            } else {
                (
                    Direction::Descendant,
                    Apply::Children {
                        mark: true,
                        activate: true,
                    },
                )
            };

            let previous_open = state.open.insert(ui_id, direction);
            state.invalidate(ui_id);

            match self.prepare(&mut state, node, direction, apply, previous_open) {
                Some(request) => request,
                None => return Ok(state.snapshot()),
            }
        };

        self.execute(request).await
    }

    /// Fetch a node's children again, for example after a mutation command succeeded.
    ///
    /// Open nodes are refetched in their current direction. Closed nodes only get their
    /// lookahead refreshed.
    pub async fn refresh(&self, ui_id: UiId) -> Result<Snapshot, ControllerError<S::Error>> {
        let request = {
            let mut state = self.inner.state.write().await;

            let Some(node) = state.node(ui_id).cloned() else {
                debug!(%ui_id, "ignoring refresh of unknown node");
                return Ok(state.snapshot());
            };

            if state.is_loading(ui_id) {
                debug!(%ui_id, "ignoring refresh of loading node");
                return Ok(state.snapshot());
            }

            let open = state.open.get(&ui_id).copied();
            let (direction, apply) = match open {
                Some(direction) => (
                    direction,
                    Apply::Children {
                        mark: direction == Direction::Descendant,
                        activate: false,
                    },
                ),
                None if self.inner.config.prefetch_lookahead => {
                    let direction = if state.descendants.contains(&ui_id) {
                        Direction::Descendant
                    } else {
                        Direction::Ascendant
                    };
                    (direction, Apply::Lookahead)
                }
                None => return Ok(state.snapshot()),
            };

            match self.prepare(&mut state, node, direction, apply, open) {
                Some(mut request) => {
                    // Cached lookahead may be exactly what changed remotely.
                    request.index.clear();
                    request
                }
                None => return Ok(state.snapshot()),
            }
        };

        self.execute(request).await
    }

    /// Refresh every position at which the given remote node is displayed.
    pub async fn refresh_node(
        &self,
        node_id: &NodeId,
    ) -> Result<Snapshot, ControllerError<S::Error>> {
        let positions = self.inner.state.read().await.tree.find_by_node_id(node_id);

        join_all(positions.into_iter().map(|ui_id| self.refresh(ui_id)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.snapshot().await)
    }

    /// Change which node types are shown. Cached nodes are kept, nothing is refetched.
    pub async fn set_visible_types(&self, types: NodeTypeSet) -> Snapshot {
        let mut state = self.inner.state.write().await;
        state.visible_types = types;
        self.publish(&state)
    }

    /// Record the selected node.
    ///
    /// Selecting a node outside of the active descendants root (or nothing) clears the root.
    pub async fn select(&self, ui_id: Option<UiId>) -> Snapshot {
        let mut state = self.inner.state.write().await;

        let selected = ui_id.filter(|ui_id| state.tree.contains(*ui_id));
        state.selected = selected;

        if let Some(root) = state.active_descendants_root {
            let within = selected.is_some_and(|ui_id| state.is_within(ui_id, root));
            if !within {
                debug!(%root, "selection left active descendants root");
                state.active_descendants_root = None;
            }
        }

        self.publish(&state)
    }

    fn prepare(
        &self,
        state: &mut ViewState,
        node: GraphNode,
        direction: Direction,
        apply: Apply,
        previous_open: Option<Direction>,
    ) -> Option<Request> {
        let ticket = state.begin(node.ui_id, direction)?;

        let index = match apply {
            Apply::Children { .. } if self.inner.config.prefetch_lookahead => {
                state.tree.lookahead_index(state.side)
            }
            _ => LookaheadIndex::new(),
        };

        self.publish(state);

        Some(Request {
            ticket,
            node,
            index,
            apply,
            previous_open,
        })
    }

    async fn execute(&self, request: Request) -> Result<Snapshot, ControllerError<S::Error>> {
        let with_lookahead = matches!(request.apply, Apply::Children { .. })
            && self.inner.config.prefetch_lookahead;

        let result = self
            .fetch(
                &request.node,
                request.ticket.direction,
                &request.index,
                with_lookahead,
            )
            .await;

        let mut state = self.inner.state.write().await;
        self.apply(&mut state, request, result)
    }

    async fn fetch(
        &self,
        node: &GraphNode,
        direction: Direction,
        index: &LookaheadIndex,
        with_lookahead: bool,
    ) -> Result<Vec<GraphNode>, FetchError<S::Error>> {
        let allowed = &self.inner.config.allowed_types;
        let children = self
            .inner
            .fetcher
            .fetch_children(node, direction, allowed)
            .await?;

        if !with_lookahead {
            return Ok(children);
        }

        Ok(LookaheadBuilder::new(&self.inner.fetcher)
            .build(children, direction, allowed, index)
            .await)
    }

    fn apply(
        &self,
        state: &mut ViewState,
        request: Request,
        result: Result<Vec<GraphNode>, FetchError<S::Error>>,
    ) -> Result<Snapshot, ControllerError<S::Error>> {
        let Request {
            ticket,
            apply,
            previous_open,
            ..
        } = request;
        let ui_id = ticket.ui_id;
        let direction = ticket.direction;

        let current = state.is_current(&ticket);
        state.finish(&ticket);

        if !current {
            debug!(%ui_id, %direction, "discarding stale fetch result");
            return Ok(self.publish(state));
        }

        let children = match result {
            Ok(children) => children,
            Err(err) => {
                warn!(%ui_id, %direction, "{err}");
                match previous_open {
                    Some(previous) => state.open.insert(ui_id, previous),
                    None => state.open.remove(&ui_id),
                };
                self.publish(state);
                return Err(err.into());
            }
        };

        match apply {
            Apply::Lookahead => {
                state.tree = state
                    .tree
                    .set_lookahead(ui_id, Lookahead::checked(direction, children));
            }
            Apply::Children { mark, activate } => {
                let ids: Vec<UiId> = children.iter().map(|child| child.ui_id).collect();
                let lookahead = Lookahead::checked(direction, children.clone());

                state.unmark_subtree(ui_id);
                state.tree = state
                    .tree
                    .replace_children(ui_id, children)
                    .set_lookahead(ui_id, lookahead);

                if mark {
                    state.descendants.extend(ids);
                }

                if activate {
                    state.active_descendants_root = Some(ui_id);
                } else if !mark && state.active_descendants_root == Some(ui_id) {
                    state.active_descendants_root = None;
                }

                state.prune();
                debug!(%ui_id, %direction, "applied fetched children");
            }
        }

        Ok(self.publish(state))
    }

    fn publish(&self, state: &ViewState) -> Snapshot {
        let snapshot = state.snapshot();
        self.inner.snapshots.send_replace(snapshot.clone());
        snapshot
    }
}

#[derive(Debug, Error)]
pub enum ControllerError<E>
where
    E: Error + 'static,
{
    #[error(transparent)]
    Fetch(#[from] FetchError<E>),

    #[error("node {0} does not offer a descendants view")]
    DescendantsUnsupported(UiId),
}
