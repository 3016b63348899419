//! Catalog graph: the sibling-link algebra
//!
//! `CatalogGraph` is an arena of one book's nodes keyed by id. Every
//! structural edit (detach, insert at front, insert after, subtree removal)
//! is a handful of O(1) pointer rewrites on that arena. The server applies
//! the edits to a graph loaded inside a transaction and writes back the
//! touched rows; the interactive client applies the very same edits to its
//! local replica, so both sides share one implementation of the algebra.
//!
//! Every mutation records which node ids it rewrote. [`CatalogGraph::take_changes`]
//! hands those back as full rows plus the list of removed ids.

use crate::models::{InsertionAnchor, TreeNode};
use crate::tree::projection::{project_index, ProjectedNode, ProjectionError};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Errors raised by graph edits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The node being edited is not part of the graph
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// A link points at a node that is not part of the graph
    #[error("Node {node_id} links to missing node {missing_id}")]
    DanglingLink { node_id: String, missing_id: String },

    /// The move would place a node inside its own subtree
    #[error("Cannot move node {node_id} into its own subtree at {target_id}")]
    WouldCreateCycle { node_id: String, target_id: String },

    /// The move references a node owned by another book
    #[error("Node {node_id} and target {target_id} belong to different books")]
    CrossBook { node_id: String, target_id: String },
}

impl GraphError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn dangling_link(node_id: impl Into<String>, missing_id: impl Into<String>) -> Self {
        Self::DanglingLink {
            node_id: node_id.into(),
            missing_id: missing_id.into(),
        }
    }

    pub fn would_create_cycle(node_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::WouldCreateCycle {
            node_id: node_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// Result of a move request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Pointers were rewritten
    Applied,
    /// The node already sits at the requested position; nothing changed
    AlreadyInPlace,
    /// The target parent or sibling no longer exists; nothing changed
    MissingTarget { target_id: String },
}

impl MoveOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied)
    }
}

/// Rows touched by graph edits since the last [`CatalogGraph::take_changes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphChanges {
    /// Current state of every rewritten node that still exists
    pub updated: Vec<TreeNode>,
    /// Ids removed from the graph
    pub removed: Vec<String>,
}

impl GraphChanges {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Arena of one book's catalog nodes
#[derive(Debug, Clone, Default)]
pub struct CatalogGraph {
    nodes: HashMap<String, TreeNode>,
    touched: BTreeSet<String>,
    removed: Vec<String>,
}

impl CatalogGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an unordered node list
    pub fn from_nodes(nodes: impl IntoIterator<Item = TreeNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            touched: BTreeSet::new(),
            removed: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn into_nodes(self) -> Vec<TreeNode> {
        self.nodes.into_values().collect()
    }

    /// Flatten the graph into pre-order rows with depth levels
    pub fn project(&self) -> Result<Vec<ProjectedNode>, ProjectionError> {
        let index = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node))
            .collect();
        project_index(&index)
    }

    /// Id of the first child of `parent` (`None` = book root), skipping `exclude`
    ///
    /// For a real parent this is its `child_id`; the root level has no
    /// owning record, so its head is the node with neither parent nor prev.
    pub fn first_child_of(&self, parent: Option<&str>, exclude: Option<&str>) -> Option<String> {
        match parent {
            Some(parent_id) => self
                .nodes
                .get(parent_id)
                .and_then(|p| p.child_id.clone())
                .filter(|id| Some(id.as_str()) != exclude),
            None => self
                .nodes
                .values()
                .find(|n| n.is_root() && n.is_first_child() && Some(n.id.as_str()) != exclude)
                .map(|n| n.id.clone()),
        }
    }

    /// Ids of the children of `parent` in list order
    pub fn children_of(&self, parent: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.first_child_of(parent, None);
        while let Some(id) = cursor {
            if !seen.insert(id.clone()) {
                break;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.sibling_id.clone());
            out.push(id);
        }
        out
    }

    /// Walk `parent_id` links upwards from `id`, nearest ancestor first
    ///
    /// Bounded by the graph size so corrupted cyclic data terminates.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent_id) = cursor {
            if out.len() >= self.nodes.len() || parent_id == id {
                break;
            }
            cursor = self.nodes.get(&parent_id).and_then(|n| n.parent_id.clone());
            out.push(parent_id);
        }
        out
    }

    /// Whether `candidate` is `ancestor` itself or lies in its subtree
    pub fn is_within_subtree(&self, candidate: &str, ancestor: &str) -> bool {
        candidate == ancestor || self.ancestors(candidate).iter().any(|id| id == ancestor)
    }

    fn edit(&mut self, id: &str, referenced_by: &str) -> Result<&mut TreeNode, GraphError> {
        match self.nodes.get_mut(id) {
            Some(node) => {
                self.touched.insert(id.to_string());
                Ok(node)
            }
            None => Err(GraphError::dangling_link(referenced_by, id)),
        }
    }

    fn require(&self, id: &str) -> Result<&TreeNode, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::node_not_found(id))
    }

    fn check_same_book(&self, node_id: &str, target_id: &str) -> Result<(), GraphError> {
        let node = self.require(node_id)?;
        let target = self.require(target_id)?;
        if node.book_id != target.book_id {
            return Err(GraphError::CrossBook {
                node_id: node_id.to_string(),
                target_id: target_id.to_string(),
            });
        }
        Ok(())
    }

    /// Unlink a node from its sibling list, repairing its old neighbours
    ///
    /// The node's own link fields are left as they were; the caller either
    /// re-attaches it (overwriting them) or removes it.
    fn detach(&mut self, id: &str) -> Result<(), GraphError> {
        let node = self.require(id)?.clone();
        let next = node.sibling_id.clone();

        if node.is_first_child() {
            if let Some(parent_id) = &node.parent_id {
                self.edit(parent_id, id)?.child_id = next.clone();
            }
        } else if let Some(prev_id) = node.previous_sibling() {
            self.edit(prev_id, id)?.sibling_id = next.clone();
        }

        if let Some(next_id) = &next {
            self.edit(next_id, id)?.prev_id = node.prev_id.clone();
        }
        Ok(())
    }

    fn attach_front(&mut self, id: &str, parent: Option<&str>) -> Result<(), GraphError> {
        let old_first = self.first_child_of(parent, Some(id));

        if let Some(parent_id) = parent {
            self.edit(parent_id, id)?.child_id = Some(id.to_string());
        }

        let node = self.edit(id, id)?;
        node.parent_id = parent.map(str::to_string);
        node.prev_id = parent.map(str::to_string);
        node.sibling_id = old_first.clone();

        if let Some(old_first) = old_first {
            self.edit(&old_first, id)?.prev_id = Some(id.to_string());
        }
        Ok(())
    }

    fn attach_after(&mut self, id: &str, after_id: &str) -> Result<(), GraphError> {
        let after = self.edit(after_id, id)?;
        let next = after.sibling_id.replace(id.to_string());
        let parent = after.parent_id.clone();

        let node = self.edit(id, after_id)?;
        node.parent_id = parent;
        node.prev_id = Some(after_id.to_string());
        node.sibling_id = next.clone();

        if let Some(next_id) = next {
            self.edit(&next_id, id)?.prev_id = Some(id.to_string());
        }
        Ok(())
    }

    /// Add a new node at the front of `parent`'s children (or the book root)
    pub fn insert_front(&mut self, node: TreeNode, parent: Option<&str>) -> Result<(), GraphError> {
        if let Some(parent_id) = parent {
            self.require(parent_id)?;
        }
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.touched.insert(id.clone());
        self.attach_front(&id, parent)
    }

    /// Move a node to the front of `new_parent`'s children (`None` = book root)
    pub fn move_to_front(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
    ) -> Result<MoveOutcome, GraphError> {
        let node = self.require(id)?;
        if node.anchor() == InsertionAnchor::FrontOf(new_parent.map(str::to_string)) {
            return Ok(MoveOutcome::AlreadyInPlace);
        }

        if let Some(parent_id) = new_parent {
            if !self.contains(parent_id) {
                return Ok(MoveOutcome::MissingTarget {
                    target_id: parent_id.to_string(),
                });
            }
            self.check_same_book(id, parent_id)?;
            if self.is_within_subtree(parent_id, id) {
                return Err(GraphError::would_create_cycle(id, parent_id));
            }
        }

        self.detach(id)?;
        self.attach_front(id, new_parent)?;
        Ok(MoveOutcome::Applied)
    }

    /// Move a node to sit immediately after `after_id`, adopting its parent
    pub fn move_after(&mut self, id: &str, after_id: &str) -> Result<MoveOutcome, GraphError> {
        let node = self.require(id)?;
        if id == after_id {
            return Ok(MoveOutcome::AlreadyInPlace);
        }
        let Some(after) = self.nodes.get(after_id) else {
            return Ok(MoveOutcome::MissingTarget {
                target_id: after_id.to_string(),
            });
        };
        if node.anchor() == InsertionAnchor::After(after_id.to_string())
            && node.parent_id == after.parent_id
        {
            return Ok(MoveOutcome::AlreadyInPlace);
        }

        self.check_same_book(id, after_id)?;
        if self.is_within_subtree(after_id, id) {
            return Err(GraphError::would_create_cycle(id, after_id));
        }

        self.detach(id)?;
        self.attach_after(id, after_id)?;
        Ok(MoveOutcome::Applied)
    }

    /// Change a node's title; structural links are untouched
    ///
    /// Returns `false` when the title was already equal.
    pub fn rename(&mut self, id: &str, title: &str) -> Result<bool, GraphError> {
        let node = self.require(id)?;
        if node.title == title {
            return Ok(false);
        }
        self.edit(id, id)?.title = title.to_string();
        Ok(true)
    }

    /// Remove a node and its whole subtree, repairing the old neighbours
    ///
    /// Returns the removed nodes, the requested node first. Descendants are
    /// gathered by `parent_id` with an explicit stack so deep catalogs do not
    /// recurse on the call stack.
    pub fn remove_subtree(&mut self, id: &str) -> Result<Vec<TreeNode>, GraphError> {
        self.require(id)?;
        self.detach(id)?;

        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in self.nodes.values() {
            if let Some(parent_id) = node.parent_id.as_deref() {
                children.entry(parent_id).or_default().push(node.id.as_str());
            }
        }

        let mut doomed = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            doomed.push(current.to_string());
            if let Some(kids) = children.get(current) {
                stack.extend(kids.iter().copied());
            }
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for doomed_id in doomed {
            if let Some(node) = self.nodes.remove(&doomed_id) {
                self.touched.remove(&doomed_id);
                self.removed.push(doomed_id);
                removed.push(node);
            }
        }
        Ok(removed)
    }

    /// Drain the set of rows rewritten or removed since the last call
    pub fn take_changes(&mut self) -> GraphChanges {
        let touched = std::mem::take(&mut self.touched);
        GraphChanges {
            updated: touched
                .iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            removed: std::mem::take(&mut self.removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;
    use crate::tree::integrity::check_invariants;

    /// Build a graph from titled nodes listed in pre-order; `parent` names an earlier title
    fn graph_with(layout: &[(&str, Option<&str>)]) -> (CatalogGraph, HashMap<String, String>) {
        let mut graph = CatalogGraph::new();
        let mut ids: HashMap<String, String> = HashMap::new();
        let mut last_child: HashMap<Option<String>, String> = HashMap::new();
        for (title, parent) in layout {
            let node = TreeNode::new("book", NodeType::Folder, *title);
            let id = node.id.clone();
            ids.insert(title.to_string(), id.clone());
            let parent_id = parent.map(|p| ids[p].clone());
            graph.insert_front(node, parent_id.as_deref()).unwrap();
            if let Some(last) = last_child.insert(parent_id, id.clone()) {
                graph.move_after(&id, &last).unwrap();
            }
        }
        graph.take_changes();
        (graph, ids)
    }

    fn titles(graph: &CatalogGraph) -> Vec<(String, usize)> {
        graph
            .project()
            .unwrap()
            .into_iter()
            .map(|row| (row.node.title.clone(), row.level))
            .collect()
    }

    fn assert_valid(graph: &CatalogGraph) {
        let nodes: Vec<TreeNode> = graph.nodes().cloned().collect();
        check_invariants(&nodes).unwrap();
    }

    fn row(title: &str, level: usize) -> (String, usize) {
        (title.to_string(), level)
    }

    #[test]
    fn test_insert_front_orders_roots() {
        let mut graph = CatalogGraph::new();
        let a = TreeNode::new("book", NodeType::Document, "A");
        let b = TreeNode::new("book", NodeType::Document, "B");
        graph.insert_front(a, None).unwrap();
        graph.insert_front(b, None).unwrap();

        assert_eq!(titles(&graph), vec![row("B", 0), row("A", 0)]);
        assert_valid(&graph);
    }

    #[test]
    fn test_insert_front_requires_parent() {
        let mut graph = CatalogGraph::new();
        let node = TreeNode::new("book", NodeType::Document, "A");
        let err = graph.insert_front(node, Some("missing")).unwrap_err();
        assert_eq!(err, GraphError::node_not_found("missing"));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_move_after_last_root() {
        let (mut graph, ids) = graph_with(&[("A", None), ("B", None), ("C", None)]);

        let outcome = graph.move_after(&ids["A"], &ids["C"]).unwrap();

        assert_eq!(outcome, MoveOutcome::Applied);
        assert_eq!(titles(&graph), vec![row("B", 0), row("C", 0), row("A", 0)]);
        assert_valid(&graph);
    }

    #[test]
    fn test_move_to_front_within_folder() {
        let (mut graph, ids) =
            graph_with(&[("F", None), ("X", Some("F")), ("Y", Some("F")), ("G", None)]);

        graph.move_to_front(&ids["Y"], Some(&ids["F"])).unwrap();

        assert_eq!(
            titles(&graph),
            vec![row("F", 0), row("Y", 1), row("X", 1), row("G", 0)]
        );
        assert_eq!(graph.get(&ids["F"]).unwrap().child_id, Some(ids["Y"].clone()));
        assert_valid(&graph);
    }

    #[test]
    fn test_move_to_front_of_root_from_folder() {
        let (mut graph, ids) = graph_with(&[("F", None), ("X", Some("F")), ("G", None)]);

        graph.move_to_front(&ids["X"], None).unwrap();

        assert_eq!(titles(&graph), vec![row("X", 0), row("F", 0), row("G", 0)]);
        assert!(!graph.get(&ids["F"]).unwrap().has_children());
        assert_valid(&graph);
    }

    #[test]
    fn test_move_noops_are_detected() {
        let (mut graph, ids) = graph_with(&[("F", None), ("X", Some("F")), ("Y", Some("F"))]);

        assert_eq!(
            graph.move_to_front(&ids["X"], Some(&ids["F"])).unwrap(),
            MoveOutcome::AlreadyInPlace
        );
        assert_eq!(
            graph.move_after(&ids["Y"], &ids["X"]).unwrap(),
            MoveOutcome::AlreadyInPlace
        );
        assert_eq!(
            graph.move_to_front(&ids["F"], None).unwrap(),
            MoveOutcome::AlreadyInPlace
        );
        assert!(graph.take_changes().is_empty());
    }

    #[test]
    fn test_move_after_twice_is_idempotent() {
        let (mut graph, ids) = graph_with(&[("A", None), ("B", None), ("C", None)]);

        graph.move_after(&ids["A"], &ids["B"]).unwrap();
        let once = titles(&graph);
        let second = graph.move_after(&ids["A"], &ids["B"]).unwrap();

        assert_eq!(second, MoveOutcome::AlreadyInPlace);
        assert_eq!(titles(&graph), once);
    }

    #[test]
    fn test_missing_targets_are_skipped() {
        let (mut graph, ids) = graph_with(&[("A", None), ("B", None)]);

        assert_eq!(
            graph.move_after(&ids["A"], "gone").unwrap(),
            MoveOutcome::MissingTarget {
                target_id: "gone".to_string()
            }
        );
        assert_eq!(
            graph.move_to_front(&ids["A"], Some("gone")).unwrap(),
            MoveOutcome::MissingTarget {
                target_id: "gone".to_string()
            }
        );
        assert!(graph.take_changes().is_empty());
    }

    #[test]
    fn test_moves_into_own_subtree_are_rejected() {
        let (mut graph, ids) = graph_with(&[("F", None), ("X", Some("F")), ("Z", Some("X"))]);

        let err = graph.move_to_front(&ids["F"], Some(&ids["Z"])).unwrap_err();
        assert!(matches!(err, GraphError::WouldCreateCycle { .. }));

        let err = graph.move_after(&ids["F"], &ids["X"]).unwrap_err();
        assert!(matches!(err, GraphError::WouldCreateCycle { .. }));

        let err = graph.move_to_front(&ids["F"], Some(&ids["F"])).unwrap_err();
        assert!(matches!(err, GraphError::WouldCreateCycle { .. }));
        assert_valid(&graph);
    }

    #[test]
    fn test_cross_book_moves_are_rejected() {
        let (mut graph, ids) = graph_with(&[("A", None)]);
        let stranger = TreeNode::new("other-book", NodeType::Folder, "S");
        let stranger_id = stranger.id.clone();
        graph.nodes.insert(stranger_id.clone(), stranger);

        let err = graph.move_to_front(&ids["A"], Some(&stranger_id)).unwrap_err();
        assert!(matches!(err, GraphError::CrossBook { .. }));
    }

    #[test]
    fn test_remove_subtree_repairs_neighbours() {
        let (mut graph, ids) = graph_with(&[
            ("A", None),
            ("B", None),
            ("C", Some("B")),
            ("D", Some("C")),
            ("E", None),
        ]);

        let removed = graph.remove_subtree(&ids["B"]).unwrap();

        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].id, ids["B"]);
        assert_eq!(titles(&graph), vec![row("A", 0), row("E", 0)]);
        assert_valid(&graph);

        let changes = graph.take_changes();
        assert_eq!(changes.removed.len(), 3);
        let updated: Vec<&str> = changes.updated.iter().map(|n| n.title.as_str()).collect();
        assert!(updated.contains(&"A"));
        assert!(updated.contains(&"E"));
    }

    #[test]
    fn test_remove_first_child_updates_parent() {
        let (mut graph, ids) = graph_with(&[("F", None), ("X", Some("F")), ("Y", Some("F"))]);

        graph.remove_subtree(&ids["X"]).unwrap();

        let folder = graph.get(&ids["F"]).unwrap();
        assert_eq!(folder.child_id, Some(ids["Y"].clone()));
        assert!(graph.get(&ids["Y"]).unwrap().is_first_child());
        assert_valid(&graph);
    }

    #[test]
    fn test_rename_leaves_links_alone() {
        let (mut graph, ids) = graph_with(&[("A", None), ("B", None)]);
        let before = graph.get(&ids["A"]).unwrap().links();

        assert!(graph.rename(&ids["A"], "Alpha").unwrap());
        assert!(!graph.rename(&ids["A"], "Alpha").unwrap());

        let after = graph.get(&ids["A"]).unwrap();
        assert_eq!(after.title, "Alpha");
        assert_eq!(after.links(), before);
    }

    #[test]
    fn test_ancestors_and_children() {
        let (graph, ids) = graph_with(&[("F", None), ("X", Some("F")), ("Z", Some("X")), ("Y", Some("F"))]);

        assert_eq!(graph.ancestors(&ids["Z"]), vec![ids["X"].clone(), ids["F"].clone()]);
        assert_eq!(
            graph.children_of(Some(&ids["F"])),
            vec![ids["X"].clone(), ids["Y"].clone()]
        );
        assert_eq!(graph.children_of(None), vec![ids["F"].clone()]);
        assert!(graph.is_within_subtree(&ids["Z"], &ids["F"]));
        assert!(!graph.is_within_subtree(&ids["F"], &ids["Z"]));
    }
}
