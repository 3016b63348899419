//! Tree Projection
//!
//! Flattens a book's stored parent/prev/sibling/child links into the ordered,
//! depth-annotated row list that renderers and drag index math consume.
//!
//! # Traversal
//!
//! Pre-order, starting at the head of the root list (no parent, no prev),
//! descending through `child_id` before following `sibling_id`. An explicit
//! stack replaces recursion, and every visited id is recorded so corrupted
//! data (a link loop, a dangling pointer, rows unreachable from the root
//! chain) surfaces as a [`ProjectionError`] instead of hanging or silently
//! dropping rows.
//!
//! The function is pure: same input, same output, whatever the storage order.

use crate::models::TreeNode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Data-integrity failures detected while flattening
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A node was reached twice: the link structure contains a loop
    #[error("Cycle detected in catalog links at node {node_id}")]
    Cycle { node_id: String },

    /// A link names a node that is not in the set
    #[error("Node {node_id} links to missing node {missing_id}")]
    DanglingLink { node_id: String, missing_id: String },

    /// More than one node claims to head the root list
    #[error("Multiple nodes claim to be the first root: {node_ids:?}")]
    DuplicateRootHead { node_ids: Vec<String> },

    /// Stored nodes that the traversal never reached
    #[error("{} node(s) unreachable from the catalog root: {node_ids:?}", .node_ids.len())]
    Unreachable { node_ids: Vec<String> },
}

/// One row of the flattened catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedNode {
    #[serde(flatten)]
    pub node: TreeNode,
    /// Depth in the tree, 0 for root nodes
    pub level: usize,
}

impl ProjectedNode {
    pub fn id(&self) -> &str {
        &self.node.id
    }

    /// Whether the row has children, so renderers can show an expand affordance
    pub fn has_children(&self) -> bool {
        self.node.has_children()
    }
}

/// Flatten an unordered node list into pre-order rows
pub fn project(nodes: &[TreeNode]) -> Result<Vec<ProjectedNode>, ProjectionError> {
    let index = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    project_index(&index)
}

pub(crate) fn project_index(
    index: &HashMap<&str, &TreeNode>,
) -> Result<Vec<ProjectedNode>, ProjectionError> {
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let mut heads: Vec<&str> = index
        .values()
        .filter(|n| n.is_root() && n.is_first_child())
        .map(|n| n.id.as_str())
        .collect();
    if heads.len() > 1 {
        heads.sort_unstable();
        return Err(ProjectionError::DuplicateRootHead {
            node_ids: heads.into_iter().map(str::to_string).collect(),
        });
    }

    let mut rows = Vec::with_capacity(index.len());
    let mut visited: HashSet<&str> = HashSet::with_capacity(index.len());
    // (node to visit, its level, the node whose link led here)
    let mut stack: Vec<(&str, usize, Option<&str>)> = heads
        .first()
        .map(|head| vec![(*head, 0, None)])
        .unwrap_or_default();

    while let Some((id, level, via)) = stack.pop() {
        let Some(node) = index.get(id) else {
            return Err(ProjectionError::DanglingLink {
                node_id: via.unwrap_or(id).to_string(),
                missing_id: id.to_string(),
            });
        };
        if !visited.insert(id) {
            return Err(ProjectionError::Cycle {
                node_id: id.to_string(),
            });
        }

        rows.push(ProjectedNode {
            node: (*node).clone(),
            level,
        });

        // sibling goes on the stack first so the subtree is emitted before it
        if let Some(sibling_id) = node.sibling_id.as_deref() {
            stack.push((sibling_id, level, Some(id)));
        }
        if let Some(child_id) = node.child_id.as_deref() {
            stack.push((child_id, level + 1, Some(id)));
        }
    }

    if visited.len() < index.len() {
        let mut node_ids: Vec<String> = index
            .keys()
            .filter(|id| !visited.contains(*id))
            .map(|id| id.to_string())
            .collect();
        node_ids.sort_unstable();
        return Err(ProjectionError::Unreachable { node_ids });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    fn node(id: &str) -> TreeNode {
        let mut n = TreeNode::new("book", NodeType::Document, id.to_uppercase());
        n.id = id.to_string();
        n
    }

    fn link(
        mut n: TreeNode,
        parent: Option<&str>,
        prev: Option<&str>,
        sibling: Option<&str>,
        child: Option<&str>,
    ) -> TreeNode {
        n.parent_id = parent.map(str::to_string);
        n.prev_id = prev.map(str::to_string);
        n.sibling_id = sibling.map(str::to_string);
        n.child_id = child.map(str::to_string);
        n
    }

    /// roots [f, g]; f has children [x, y]; x has child z
    fn sample() -> Vec<TreeNode> {
        vec![
            link(node("f"), None, None, Some("g"), Some("x")),
            link(node("x"), Some("f"), Some("f"), Some("y"), Some("z")),
            link(node("z"), Some("x"), Some("x"), None, None),
            link(node("y"), Some("f"), Some("x"), None, None),
            link(node("g"), None, Some("f"), None, None),
        ]
    }

    fn ids_and_levels(rows: &[ProjectedNode]) -> Vec<(&str, usize)> {
        rows.iter().map(|r| (r.id(), r.level)).collect()
    }

    #[test]
    fn test_preorder_with_levels() {
        let rows = project(&sample()).unwrap();
        assert_eq!(
            ids_and_levels(&rows),
            vec![("f", 0), ("x", 1), ("z", 2), ("y", 1), ("g", 0)]
        );
        assert!(rows[0].has_children());
        assert!(!rows[2].has_children());
    }

    #[test]
    fn test_storage_order_does_not_matter() {
        let forward = project(&sample()).unwrap();
        let mut shuffled = sample();
        shuffled.reverse();
        shuffled.swap(1, 3);

        assert_eq!(project(&shuffled).unwrap(), forward);
        assert_eq!(project(&sample()).unwrap(), forward);
    }

    #[test]
    fn test_empty_book() {
        assert!(project(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_reported() {
        let nodes = vec![
            link(node("a"), None, None, Some("b"), None),
            link(node("b"), None, Some("a"), Some("a"), None),
        ];
        assert_eq!(
            project(&nodes),
            Err(ProjectionError::Cycle {
                node_id: "a".to_string()
            })
        );
    }

    #[test]
    fn test_child_loop_is_reported() {
        let nodes = vec![link(node("a"), None, None, None, Some("a"))];
        assert!(matches!(project(&nodes), Err(ProjectionError::Cycle { .. })));
    }

    #[test]
    fn test_dangling_link_is_reported() {
        let nodes = vec![link(node("a"), None, None, Some("ghost"), None)];
        assert_eq!(
            project(&nodes),
            Err(ProjectionError::DanglingLink {
                node_id: "a".to_string(),
                missing_id: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_unreachable_rows_are_not_dropped() {
        let mut nodes = sample();
        // detach g from f's sibling pointer without repairing anything else
        nodes[0].sibling_id = None;

        assert_eq!(
            project(&nodes),
            Err(ProjectionError::Unreachable {
                node_ids: vec!["g".to_string()]
            })
        );
    }

    #[test]
    fn test_duplicate_root_heads() {
        let nodes = vec![
            link(node("a"), None, None, None, None),
            link(node("b"), None, None, None, None),
        ];
        assert!(matches!(
            project(&nodes),
            Err(ProjectionError::DuplicateRootHead { .. })
        ));
    }

    #[test]
    fn test_rows_serialize_flat() {
        let rows = project(&sample()).unwrap();
        let value = serde_json::to_value(&rows[1]).unwrap();
        assert_eq!(value["id"], "x");
        assert_eq!(value["level"], 1);
        assert_eq!(value["parentId"], "f");
    }
}
