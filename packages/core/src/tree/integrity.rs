//! Catalog invariant checker
//!
//! Verifies a book's node set against the sibling-link invariants:
//!
//! 1. each parent's children (by `parent_id`) form one list, head to tail,
//!    with `prev_id`/`sibling_id` agreeing in both directions
//! 2. `parent.child_id` names the head of that list (or is `None`)
//! 3. exactly one node heads each non-empty list
//! 4. no node is its own ancestor
//! 5. every `parent_id` names an existing node
//!
//! Used by tests after every mutation and by the `catalog-inspect` binary.

use crate::models::TreeNode;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    #[error("Node {node_id} references missing parent {parent_id}")]
    MissingParent { node_id: String, parent_id: String },

    #[error("Children of {parent:?} have no head node")]
    MissingHead { parent: Option<String> },

    #[error("Children of {parent:?} have several head nodes: {node_ids:?}")]
    DuplicateHead {
        parent: Option<String>,
        node_ids: Vec<String>,
    },

    #[error("Sibling chain under {parent:?} is broken at {node_id}: {reason}")]
    BrokenChain {
        parent: Option<String>,
        node_id: String,
        reason: String,
    },

    #[error("Node {parent_id} has child_id {actual:?}, expected {expected:?}")]
    ChildPointerMismatch {
        parent_id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("Node {node_id} is its own ancestor")]
    Cycle { node_id: String },
}

/// Check invariants 1-5 over one book's nodes
pub fn check_invariants(nodes: &[TreeNode]) -> Result<(), IntegrityViolation> {
    let index: HashMap<&str, &TreeNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    // BTreeMap keeps violation reporting deterministic
    let mut groups: BTreeMap<Option<&str>, Vec<&TreeNode>> = BTreeMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.as_deref() {
            if !index.contains_key(parent_id) {
                return Err(IntegrityViolation::MissingParent {
                    node_id: node.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
        groups.entry(node.parent_id.as_deref()).or_default().push(node);
    }

    for (parent, members) in &groups {
        check_sibling_list(*parent, members, &index)?;
    }

    // parents without children must not claim one
    for node in nodes {
        if !groups.contains_key(&Some(node.id.as_str())) && node.child_id.is_some() {
            return Err(IntegrityViolation::ChildPointerMismatch {
                parent_id: node.id.clone(),
                expected: None,
                actual: node.child_id.clone(),
            });
        }
    }

    for node in nodes {
        let mut seen = HashSet::new();
        let mut cursor = node.parent_id.as_deref();
        while let Some(parent_id) = cursor {
            if parent_id == node.id || !seen.insert(parent_id) {
                return Err(IntegrityViolation::Cycle {
                    node_id: node.id.clone(),
                });
            }
            cursor = index.get(parent_id).and_then(|p| p.parent_id.as_deref());
        }
    }

    Ok(())
}

fn check_sibling_list(
    parent: Option<&str>,
    members: &[&TreeNode],
    index: &HashMap<&str, &TreeNode>,
) -> Result<(), IntegrityViolation> {
    let owned_parent = parent.map(str::to_string);
    let heads: Vec<&TreeNode> = members
        .iter()
        .copied()
        .filter(|n| n.is_first_child())
        .collect();

    let head = match heads.as_slice() {
        [] => {
            return Err(IntegrityViolation::MissingHead {
                parent: owned_parent,
            })
        }
        [head] => *head,
        many => {
            let mut node_ids: Vec<String> = many.iter().map(|n| n.id.clone()).collect();
            node_ids.sort_unstable();
            return Err(IntegrityViolation::DuplicateHead {
                parent: owned_parent,
                node_ids,
            });
        }
    };

    if let Some(parent_id) = parent {
        let parent_node = index[parent_id];
        if parent_node.child_id.as_deref() != Some(head.id.as_str()) {
            return Err(IntegrityViolation::ChildPointerMismatch {
                parent_id: parent_id.to_string(),
                expected: Some(head.id.clone()),
                actual: parent_node.child_id.clone(),
            });
        }
    }

    let broken = |node_id: &str, reason: String| IntegrityViolation::BrokenChain {
        parent: parent.map(str::to_string),
        node_id: node_id.to_string(),
        reason,
    };

    let mut walked = 1;
    let mut current = head;
    while let Some(next_id) = current.sibling_id.as_deref() {
        let next = *index
            .get(next_id)
            .ok_or_else(|| broken(&current.id, format!("sibling {next_id} does not exist")))?;
        if next.parent_id.as_deref() != parent {
            return Err(broken(next_id, "sibling has a different parent".to_string()));
        }
        if next.prev_id.as_deref() != Some(current.id.as_str()) {
            return Err(broken(
                next_id,
                format!("prev_id {:?} does not point back to {}", next.prev_id, current.id),
            ));
        }
        walked += 1;
        if walked > members.len() {
            return Err(broken(next_id, "sibling chain loops".to_string()));
        }
        current = next;
    }

    if walked != members.len() {
        return Err(broken(
            &current.id,
            format!("chain covers {walked} of {} children", members.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    fn node(
        id: &str,
        parent: Option<&str>,
        prev: Option<&str>,
        sibling: Option<&str>,
        child: Option<&str>,
    ) -> TreeNode {
        let mut n = TreeNode::new("book", NodeType::Folder, id);
        n.id = id.to_string();
        n.parent_id = parent.map(str::to_string);
        n.prev_id = prev.map(str::to_string);
        n.sibling_id = sibling.map(str::to_string);
        n.child_id = child.map(str::to_string);
        n
    }

    fn valid() -> Vec<TreeNode> {
        vec![
            node("a", None, None, Some("b"), None),
            node("b", None, Some("a"), None, Some("c")),
            node("c", Some("b"), Some("b"), Some("d"), None),
            node("d", Some("b"), Some("c"), None, None),
        ]
    }

    #[test]
    fn test_valid_tree_passes() {
        assert_eq!(check_invariants(&valid()), Ok(()));
        assert_eq!(check_invariants(&[]), Ok(()));
    }

    #[test]
    fn test_missing_parent() {
        let mut nodes = valid();
        nodes.push(node("e", Some("ghost"), Some("ghost"), None, None));
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::MissingParent { .. })
        ));
    }

    #[test]
    fn test_duplicate_head() {
        let mut nodes = valid();
        nodes[3].prev_id = Some("b".to_string());
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::DuplicateHead { .. })
        ));
    }

    #[test]
    fn test_child_pointer_mismatch() {
        let mut nodes = valid();
        nodes[1].child_id = Some("d".to_string());
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::ChildPointerMismatch { .. })
        ));

        let mut nodes = valid();
        nodes[0].child_id = Some("c".to_string());
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::ChildPointerMismatch { .. })
        ));
    }

    #[test]
    fn test_broken_back_pointer() {
        let mut nodes = valid();
        nodes[3].prev_id = Some("a".to_string());
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::BrokenChain { .. })
        ));
    }

    #[test]
    fn test_short_chain() {
        let mut nodes = valid();
        nodes[2].sibling_id = None;
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::BrokenChain { .. })
        ));
    }

    #[test]
    fn test_parent_cycle() {
        let nodes = vec![
            node("a", Some("b"), Some("b"), None, Some("b")),
            node("b", Some("a"), Some("a"), None, Some("a")),
        ];
        assert!(matches!(
            check_invariants(&nodes),
            Err(IntegrityViolation::Cycle { .. })
        ));
    }
}
