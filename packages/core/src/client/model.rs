//! Optimistic client model
//!
//! `OptimisticCatalog` mirrors one book's catalog in memory so structural
//! edits show up before the server answers. Each edit runs in two halves:
//!
//! - [`begin`](OptimisticCatalog::begin) applies the edit to the local
//!   [`CatalogGraph`] with the same pointer algebra the server uses
//! - [`settle`](OptimisticCatalog::settle) takes the server's answer: a
//!   projected catalog replaces the local state wholesale, a failure records
//!   an error notification and refetches server truth (falling back to the
//!   last confirmed snapshot if the refetch fails too)
//!
//! The view therefore never diverges from the server for longer than one
//! round trip.

use crate::client::backend::CatalogBackend;
use crate::client::drag::ReachLevel;
use crate::config::ReconcilePolicy;
use crate::models::{validate_title, ValidationError};
use crate::services::CatalogServiceError;
use crate::tree::{CatalogGraph, GraphError, ProjectedNode, ProjectionError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised on the client side before or after a server round trip
#[derive(Error, Debug)]
pub enum ClientError {
    /// The local edit was refused; nothing was sent to the server
    #[error("Edit rejected: {0}")]
    Rejected(#[from] GraphError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// The local replica could not be flattened
    #[error("Local catalog is inconsistent: {0}")]
    Projection(#[from] ProjectionError),

    /// The backend failed on a plain read
    #[error("Backend request failed: {0}")]
    Backend(#[from] CatalogServiceError),

    #[error("Node not visible in the catalog: {id}")]
    NodeNotVisible { id: String },
}

/// One structural edit as dispatched by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOperation {
    DeleteWithChildren { node_id: String },
    MoveToFront {
        node_id: String,
        parent_id: Option<String>,
    },
    MoveAfter { node_id: String, after_id: String },
    Rename { node_id: String, title: String },
}

impl TreeOperation {
    pub fn delete(node_id: impl Into<String>) -> Self {
        Self::DeleteWithChildren {
            node_id: node_id.into(),
        }
    }

    pub fn move_to_front(node_id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self::MoveToFront {
            node_id: node_id.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    pub fn move_after(node_id: impl Into<String>, after_id: impl Into<String>) -> Self {
        Self::MoveAfter {
            node_id: node_id.into(),
            after_id: after_id.into(),
        }
    }

    pub fn rename(node_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::Rename {
            node_id: node_id.into(),
            title: title.into(),
        }
    }

    /// The node the operation acts on
    pub fn node_id(&self) -> &str {
        match self {
            TreeOperation::DeleteWithChildren { node_id }
            | TreeOperation::MoveToFront { node_id, .. }
            | TreeOperation::MoveAfter { node_id, .. }
            | TreeOperation::Rename { node_id, .. } => node_id,
        }
    }

    /// Run the operation against the server
    pub async fn execute(
        &self,
        backend: &dyn CatalogBackend,
        book_id: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        match self {
            TreeOperation::DeleteWithChildren { node_id } => {
                backend.delete_with_children(node_id).await
            }
            TreeOperation::MoveToFront { node_id, parent_id } => {
                backend
                    .move_to_front(book_id, node_id, parent_id.as_deref())
                    .await
            }
            TreeOperation::MoveAfter { node_id, after_id } => {
                backend.move_after(book_id, node_id, after_id).await
            }
            TreeOperation::Rename { node_id, title } => backend.update_title(node_id, title).await,
        }
    }
}

/// A locally applied edit awaiting the server's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Monotonic per-catalog sequence number
    pub seq: u64,
    pub operation: TreeOperation,
}

/// How a server answer was folded into the local model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The server's catalog replaced the local state
    Reconciled,
    /// The answer belonged to an operation older than one already settled
    IgnoredStale,
    /// The server refused; local state was reset to server truth
    RolledBack { error: String },
}

/// In-memory mirror of one book's catalog with speculative edits
#[derive(Debug, Clone)]
pub struct OptimisticCatalog {
    book_id: String,
    policy: ReconcilePolicy,
    confirmed: Vec<ProjectedNode>,
    graph: CatalogGraph,
    expanded: HashSet<String>,
    reach: HashMap<String, ReachLevel>,
    next_seq: u64,
    newest_settled: u64,
    last_error: Option<String>,
}

impl OptimisticCatalog {
    pub fn new(book_id: impl Into<String>, policy: ReconcilePolicy) -> Self {
        Self {
            book_id: book_id.into(),
            policy,
            confirmed: Vec::new(),
            graph: CatalogGraph::new(),
            expanded: HashSet::new(),
            reach: HashMap::new(),
            next_seq: 0,
            newest_settled: 0,
            last_error: None,
        }
    }

    /// Build a model from an already fetched catalog
    pub fn from_rows(
        book_id: impl Into<String>,
        policy: ReconcilePolicy,
        rows: Vec<ProjectedNode>,
    ) -> Self {
        let mut catalog = Self::new(book_id, policy);
        catalog.replace_with(rows);
        catalog
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Fetch the catalog from the server, replacing all local state
    pub async fn load(&mut self, backend: &dyn CatalogBackend) -> Result<(), ClientError> {
        let rows = backend.catalog(&self.book_id).await?;
        self.replace_with(rows);
        Ok(())
    }

    /// Adopt a server catalog as the new confirmed state
    fn replace_with(&mut self, rows: Vec<ProjectedNode>) {
        self.graph = CatalogGraph::from_nodes(rows.iter().map(|r| r.node.clone()));
        let graph = &self.graph;
        self.expanded.retain(|id| graph.contains(id));
        self.reach.retain(|id, _| graph.contains(id));
        self.confirmed = rows;
    }

    /// The last catalog the server confirmed
    pub fn confirmed(&self) -> &[ProjectedNode] {
        &self.confirmed
    }

    /// Full projection of the local state, speculative edits included
    pub fn rows(&self) -> Result<Vec<ProjectedNode>, ProjectionError> {
        self.graph.project()
    }

    /// Rows whose ancestors are all expanded
    pub fn visible_rows(&self) -> Result<Vec<ProjectedNode>, ProjectionError> {
        let mut visible = Vec::new();
        let mut hidden_below: Option<usize> = None;
        for row in self.rows()? {
            if let Some(level) = hidden_below {
                if row.level > level {
                    continue;
                }
                hidden_below = None;
            }
            if row.has_children() && !self.expanded.contains(row.id()) {
                hidden_below = Some(row.level);
            }
            visible.push(row);
        }
        Ok(visible)
    }

    pub fn graph(&self) -> &CatalogGraph {
        &self.graph
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn expanded(&self) -> &HashSet<String> {
        &self.expanded
    }

    /// Flip a node's expansion, returning the new state
    pub fn toggle_expanded(&mut self, id: &str) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.to_string());
            true
        }
    }

    pub fn expand(&mut self, id: &str) {
        self.expanded.insert(id.to_string());
    }

    pub fn collapse(&mut self, id: &str) {
        self.expanded.remove(id);
    }

    /// Replace the expanded set, dropping ids that no longer exist
    pub fn restore_expanded(&mut self, mut expanded: HashSet<String>) {
        expanded.retain(|id| self.graph.contains(id));
        self.expanded = expanded;
    }

    /// Current drag reach of a node, if a drag recorded one
    pub fn reach(&self, id: &str) -> Option<ReachLevel> {
        self.reach.get(id).copied()
    }

    pub(crate) fn set_reach(&mut self, id: &str, reach: ReachLevel) {
        self.reach.insert(id.to_string(), reach);
    }

    pub(crate) fn clear_reach(&mut self, id: &str) {
        self.reach.remove(id);
    }

    /// Take the pending error notification, if any
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Apply an edit locally and hand back the token to settle it with
    ///
    /// Edits the local algebra refuses (a cycle, an unknown node) fail here
    /// and must not be sent to the server. A refused edit leaves the local
    /// graph exactly as it was, even if it failed halfway through relinking.
    pub fn begin(&mut self, operation: TreeOperation) -> Result<PendingMutation, ClientError> {
        let snapshot = self.graph.clone();
        let removed = match self.apply_locally(&operation) {
            Ok(removed) => removed,
            Err(err) => {
                self.graph = snapshot;
                return Err(err);
            }
        };
        for id in &removed {
            self.expanded.remove(id);
            self.reach.remove(id);
        }
        self.graph.take_changes();

        self.next_seq += 1;
        tracing::debug!("applied {:?} locally as #{}", operation, self.next_seq);
        Ok(PendingMutation {
            seq: self.next_seq,
            operation,
        })
    }

    /// Run one edit against the local graph, returning the ids it removed
    fn apply_locally(&mut self, operation: &TreeOperation) -> Result<Vec<String>, ClientError> {
        match operation {
            TreeOperation::DeleteWithChildren { node_id } => {
                let removed = self.graph.remove_subtree(node_id)?;
                return Ok(removed.into_iter().map(|node| node.id).collect());
            }
            TreeOperation::MoveToFront { node_id, parent_id } => {
                self.graph.move_to_front(node_id, parent_id.as_deref())?;
            }
            TreeOperation::MoveAfter { node_id, after_id } => {
                self.graph.move_after(node_id, after_id)?;
            }
            TreeOperation::Rename { node_id, title } => {
                let title = validate_title(title)?;
                self.graph.rename(node_id, &title)?;
            }
        }
        Ok(Vec::new())
    }

    /// Fold the server's answer to `pending` into the local state
    pub async fn settle(
        &mut self,
        pending: PendingMutation,
        result: Result<Vec<ProjectedNode>, CatalogServiceError>,
        backend: &dyn CatalogBackend,
    ) -> SettleOutcome {
        match result {
            Ok(rows) => {
                if self.policy == ReconcilePolicy::RejectStale && pending.seq < self.newest_settled
                {
                    tracing::debug!(
                        "ignoring stale response #{} (newest settled #{})",
                        pending.seq,
                        self.newest_settled
                    );
                    return SettleOutcome::IgnoredStale;
                }
                self.newest_settled = self.newest_settled.max(pending.seq);
                self.replace_with(rows);
                SettleOutcome::Reconciled
            }
            Err(err) => {
                let error = err.to_string();
                tracing::warn!(
                    "{:?} failed on the server, reverting: {}",
                    pending.operation,
                    error
                );
                self.last_error = Some(error.clone());
                self.newest_settled = self.newest_settled.max(pending.seq);
                match backend.catalog(&self.book_id).await {
                    Ok(rows) => self.replace_with(rows),
                    Err(fetch_err) => {
                        tracing::warn!(
                            "refetch failed, restoring last confirmed catalog: {}",
                            fetch_err
                        );
                        let confirmed = std::mem::take(&mut self.confirmed);
                        self.replace_with(confirmed);
                    }
                }
                SettleOutcome::RolledBack { error }
            }
        }
    }

    /// Apply `operation` locally, send it, and settle the answer
    pub async fn dispatch(
        &mut self,
        backend: &dyn CatalogBackend,
        operation: TreeOperation,
    ) -> Result<SettleOutcome, ClientError> {
        let pending = self.begin(operation)?;
        let result = pending.operation.execute(backend, &self.book_id).await;
        Ok(self.settle(pending, result, backend).await)
    }
}
