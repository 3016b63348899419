//! Drag interaction and level resolution
//!
//! Turns a pointer gesture over the flattened, virtualized catalog into one
//! structural operation. The geometry lives in pure functions so it can be
//! tested without any rendering layer:
//!
//! - [`reach_range`]: the depths a dragged node may take at a drop slot
//! - [`level_for_displacement`]: horizontal pixels to a clamped depth
//! - [`resolve_drop`]: slot and depth to a [`TreeOperation`]
//!
//! [`DragController`] strings them into the Idle/Dragging state machine and
//! owns the expanded-set snapshot taken at drag start.
//!
//! # Slots
//!
//! Drop slots index the visible rows *with* the dragged row still present:
//! slot `i` means "before visible row `i`", slot `len` means "after the last
//! row". Resolution works on the list with the dragged row removed, so a
//! slot below the dragged row shifts up by one.

use crate::client::backend::CatalogBackend;
use crate::client::model::{ClientError, OptimisticCatalog, SettleOutcome, TreeOperation};
use crate::config::DragConfig;
use crate::tree::ProjectedNode;
use std::collections::{HashMap, HashSet};

/// Inclusive range of depths a dragged node can be dropped at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachLevel {
    pub min: usize,
    pub max: usize,
}

impl ReachLevel {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn clamp(&self, level: usize) -> usize {
        level.clamp(self.min, self.max)
    }

    pub fn contains(&self, level: usize) -> bool {
        (self.min..=self.max).contains(&level)
    }
}

/// Pointer position during a drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverPosition {
    /// Drop slot in the visible rows (dragged row included)
    pub slot: usize,
    /// Horizontal displacement from the drag origin, in pixels
    pub dx: f64,
}

/// Where the user released the dragged row
#[derive(Debug, Clone, PartialEq)]
pub enum DropTarget {
    /// Between two rows
    Slot(HoverPosition),
    /// Onto a row: become its first child
    Combine { target_id: String },
    /// Outside any valid target
    Outside,
}

/// Live feedback for the current pointer position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPreview {
    /// Slot in the list without the dragged row
    pub destination: usize,
    /// Row the dragged node would follow, if any
    pub anchor_id: Option<String>,
    pub reach: ReachLevel,
    /// Depth the node would land at
    pub level: usize,
}

/// Map horizontal displacement to a depth inside `range`
///
/// Each full `indent_width` of displacement shifts one level from
/// `base_level`; partial indents do not count.
pub fn level_for_displacement(
    base_level: usize,
    dx: f64,
    indent_width: f64,
    range: ReachLevel,
) -> usize {
    if !dx.is_finite() || !indent_width.is_finite() || indent_width <= 0.0 {
        return range.clamp(base_level);
    }
    let target = base_level as f64 + (dx / indent_width).trunc();
    if target <= 0.0 {
        range.clamp(0)
    } else {
        range.clamp(target as usize)
    }
}

/// Whether a row can take a new first child
fn accepts_child(row: &ProjectedNode) -> bool {
    row.node.is_folder() || row.has_children()
}

/// Depth range at `destination` in `others` (visible rows minus the dragged one)
///
/// The row above the slot caps the depth: its own level, or one deeper if
/// it can take children. The row below the slot is the floor, since the
/// dragged node cannot out-dent past the node that will follow it.
pub fn reach_range(others: &[ProjectedNode], destination: usize) -> ReachLevel {
    let destination = destination.min(others.len());
    if destination == 0 {
        return ReachLevel::new(0, 0);
    }
    let anchor = &others[destination - 1];
    let max = if accepts_child(anchor) {
        anchor.level + 1
    } else {
        anchor.level
    };
    let min = others.get(destination).map(|below| below.level).unwrap_or(0);
    ReachLevel::new(min, max)
}

/// Turn a slot and depth into the operation that realizes it
///
/// `target_level` is expected inside [`reach_range`]; a deeper value is
/// clamped to the anchor's reach rather than rejected.
pub fn resolve_drop(
    others: &[ProjectedNode],
    destination: usize,
    target_level: usize,
    dragged_id: &str,
) -> TreeOperation {
    let destination = destination.min(others.len());
    if destination == 0 {
        return TreeOperation::move_to_front(dragged_id, None);
    }

    let anchor = &others[destination - 1];
    let target_level = target_level.min(reach_range(others, destination).max);
    if target_level > anchor.level {
        return TreeOperation::move_to_front(dragged_id, Some(anchor.id()));
    }

    let by_id: HashMap<&str, &ProjectedNode> = others.iter().map(|r| (r.id(), r)).collect();
    let mut sibling = anchor;
    for _ in target_level..anchor.level {
        match sibling.node.parent_id.as_deref().and_then(|id| by_id.get(id).copied()) {
            Some(parent) => sibling = parent,
            None => break,
        }
    }
    TreeOperation::move_after(dragged_id, sibling.id())
}

/// Drag gesture state
#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging(DragSession),
}

/// Bookkeeping for the drag in progress
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub node_id: String,
    /// Depth of the dragged row when the drag started
    pub base_level: usize,
    /// Visible index of the dragged row when the drag started
    pub origin: usize,
    expanded_snapshot: HashSet<String>,
    pub preview: Option<DragPreview>,
}

/// Idle/Dragging state machine for one catalog view
#[derive(Debug, Clone)]
pub struct DragController {
    indent_width: f64,
    state: DragState,
}

impl DragController {
    pub fn new(config: &DragConfig) -> Self {
        Self {
            indent_width: config.indent_width,
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Start dragging a visible row
    ///
    /// Snapshots the expanded set, then collapses the dragged node and its
    /// descendants so the subtree travels as one row.
    pub fn start(
        &mut self,
        catalog: &mut OptimisticCatalog,
        node_id: &str,
    ) -> Result<(), ClientError> {
        if self.is_dragging() {
            self.cancel(catalog);
        }

        let visible = catalog.visible_rows()?;
        let (origin, row) = visible
            .iter()
            .enumerate()
            .find(|(_, r)| r.id() == node_id)
            .ok_or_else(|| ClientError::NodeNotVisible {
                id: node_id.to_string(),
            })?;
        let base_level = row.level;

        let expanded_snapshot = catalog.expanded().clone();
        let subtree: Vec<String> = catalog
            .expanded()
            .iter()
            .filter(|id| catalog.graph().is_within_subtree(id, node_id))
            .cloned()
            .collect();
        for id in &subtree {
            catalog.collapse(id);
        }

        tracing::debug!("drag started on {} at row {}", node_id, origin);
        self.state = DragState::Dragging(DragSession {
            node_id: node_id.to_string(),
            base_level,
            origin,
            expanded_snapshot,
            preview: None,
        });
        Ok(())
    }

    /// Visible rows without the dragged one, and the slot mapped onto them
    fn others_and_destination(
        catalog: &OptimisticCatalog,
        session: &DragSession,
        slot: usize,
    ) -> Result<(Vec<ProjectedNode>, usize), ClientError> {
        let visible = catalog.visible_rows()?;
        let origin = visible
            .iter()
            .position(|r| r.id() == session.node_id)
            .unwrap_or(session.origin);
        let destination = if slot > origin { slot - 1 } else { slot };
        let others: Vec<ProjectedNode> = visible
            .into_iter()
            .filter(|r| r.id() != session.node_id)
            .collect();
        let destination = destination.min(others.len());
        Ok((others, destination))
    }

    /// Recompute the preview for a new pointer position
    ///
    /// Returns `None` when no drag is in progress.
    pub fn update(
        &mut self,
        catalog: &mut OptimisticCatalog,
        hover: HoverPosition,
    ) -> Result<Option<DragPreview>, ClientError> {
        let DragState::Dragging(session) = &mut self.state else {
            return Ok(None);
        };

        let (others, destination) = Self::others_and_destination(catalog, session, hover.slot)?;
        let reach = reach_range(&others, destination);
        let level = level_for_displacement(session.base_level, hover.dx, self.indent_width, reach);
        catalog.set_reach(&session.node_id, reach);

        let preview = DragPreview {
            destination,
            anchor_id: destination
                .checked_sub(1)
                .map(|i| others[i].id().to_string()),
            reach,
            level,
        };
        session.preview = Some(preview.clone());
        Ok(Some(preview))
    }

    /// Resolve the drop into an operation without dispatching it
    fn resolve(
        &self,
        catalog: &OptimisticCatalog,
        session: &DragSession,
        target: &DropTarget,
    ) -> Result<Option<TreeOperation>, ClientError> {
        match target {
            DropTarget::Outside => Ok(None),
            DropTarget::Combine { target_id } => {
                if catalog.graph().is_within_subtree(target_id, &session.node_id) {
                    return Ok(None);
                }
                Ok(Some(TreeOperation::move_to_front(
                    &session.node_id,
                    Some(target_id.as_str()),
                )))
            }
            DropTarget::Slot(hover) => {
                let (others, destination) =
                    Self::others_and_destination(catalog, session, hover.slot)?;
                let reach = reach_range(&others, destination);
                let level =
                    level_for_displacement(session.base_level, hover.dx, self.indent_width, reach);
                Ok(Some(resolve_drop(
                    &others,
                    destination,
                    level,
                    &session.node_id,
                )))
            }
        }
    }

    /// Leave the Dragging state, handing back the session
    fn end(&mut self, catalog: &mut OptimisticCatalog) -> Option<DragSession> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging(session) => {
                catalog.clear_reach(&session.node_id);
                Some(session)
            }
            DragState::Idle => None,
        }
    }

    /// Finish the drag and return the operation to dispatch, if any
    ///
    /// The pre-drag expanded set is restored before returning.
    pub fn drop(
        &mut self,
        catalog: &mut OptimisticCatalog,
        target: DropTarget,
    ) -> Result<Option<TreeOperation>, ClientError> {
        let Some(session) = self.end(catalog) else {
            return Ok(None);
        };
        let operation = self.resolve(catalog, &session, &target);
        catalog.restore_expanded(session.expanded_snapshot);
        operation
    }

    /// Finish the drag and dispatch the resolved operation
    ///
    /// The pre-drag expanded set is restored once the operation settles.
    pub async fn drop_and_dispatch(
        &mut self,
        catalog: &mut OptimisticCatalog,
        backend: &dyn CatalogBackend,
        target: DropTarget,
    ) -> Result<Option<SettleOutcome>, ClientError> {
        let Some(session) = self.end(catalog) else {
            return Ok(None);
        };
        let outcome = match self.resolve(catalog, &session, &target) {
            Ok(Some(operation)) => catalog.dispatch(backend, operation).await.map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        catalog.restore_expanded(session.expanded_snapshot);
        outcome
    }

    /// Abandon the drag; no operation is produced
    pub fn cancel(&mut self, catalog: &mut OptimisticCatalog) {
        if let Some(session) = self.end(catalog) {
            tracing::debug!("drag on {} cancelled", session.node_id);
            catalog.restore_expanded(session.expanded_snapshot);
        }
    }
}
