//! Catalog Node Data Structures
//!
//! This module defines `TreeNode`, one row of a book's catalog tree, and the
//! sparse `NodePatch` used for title edits and pointer repairs.
//!
//! # Sibling Linking
//!
//! Sibling order is stored as a doubly linked list per parent rather than
//! as an integer sort index:
//!
//! - `parent_id`: the node whose child list this node belongs to (`None` = book root)
//! - `prev_id`: the previous sibling, or `parent_id` itself when this node is
//!   the first child (for the first root node both are `None`)
//! - `sibling_id`: the next sibling (`None` = last in its list)
//! - `child_id`: the first child (`None` = no children)
//!
//! The dual meaning of `prev_id` is wrapped by [`TreeNode::is_first_child`]
//! and [`TreeNode::anchor`]; call sites should not compare the two fields
//! directly.
//!
//! # Examples
//!
//! ```rust
//! use inkdesk_core::models::{InsertionAnchor, NodeType, TreeNode};
//!
//! let folder = TreeNode::new("book-1", NodeType::Folder, "Guides");
//! assert!(folder.is_root());
//! assert!(folder.is_first_child());
//! assert_eq!(folder.anchor(), InsertionAnchor::FrontOf(None));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a node title, in characters
pub const MAX_TITLE_LENGTH: usize = 255;

/// Validation errors for catalog models
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Title is {length} characters long, maximum is {max}")]
    TitleTooLong { length: usize, max: usize },

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),
}

/// Variant tag of a catalog node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "DOCUMENT")]
    Document,
    #[serde(rename = "FOLDER")]
    Folder,
}

impl NodeType {
    /// Database representation of the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Document => "DOCUMENT",
            NodeType::Folder => "FOLDER",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOCUMENT" => Ok(NodeType::Document),
            "FOLDER" => Ok(NodeType::Folder),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

/// Where a node sits relative to its neighbours, as encoded by `prev_id`
///
/// `FrontOf(p)` is stored as `prev_id == parent_id == p`; `After(s)` is
/// stored as `prev_id == s` with `s` a sibling under the same parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InsertionAnchor {
    /// First child of the given parent (`None` = first root node)
    FrontOf(Option<String>),
    /// Immediately after the given sibling
    After(String),
}

impl InsertionAnchor {
    /// Value the `prev_id` column takes for this anchor
    pub fn prev_id(&self) -> Option<&str> {
        match self {
            InsertionAnchor::FrontOf(parent) => parent.as_deref(),
            InsertionAnchor::After(sibling) => Some(sibling),
        }
    }
}

/// One document or folder in a book's catalog tree
///
/// Serialized field names match the persisted shape
/// (`id, bookId, type, title, parentId, prevId, siblingId, childId, docId, url`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Unique, immutable identifier (UUID v4)
    pub id: String,

    /// Owning book; never reassigned
    pub book_id: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Display title, mirrored into the backing document for document nodes
    pub title: String,

    /// Parent node (`None` = book root level)
    pub parent_id: Option<String>,

    /// Previous sibling, or the parent id when this node is the first child
    pub prev_id: Option<String>,

    /// Next sibling (`None` = last in its list)
    pub sibling_id: Option<String>,

    /// First child (`None` = no children)
    pub child_id: Option<String>,

    /// Backing document record (document nodes only)
    pub doc_id: Option<String>,

    /// Routing segment, mirrors the document slug
    pub url: Option<String>,
}

impl TreeNode {
    /// Create a detached node at the front of the book root
    ///
    /// Pointer fields are all `None`; the caller links it into place.
    pub fn new(book_id: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.into(),
            node_type,
            title: title.into(),
            parent_id: None,
            prev_id: None,
            sibling_id: None,
            child_id: None,
            doc_id: None,
            url: None,
        }
    }

    /// Builder helper attaching a backing document and its slug
    pub fn with_document(mut self, doc_id: impl Into<String>, slug: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self.url = Some(slug.into());
        self
    }

    /// Whether this node sits at book root level
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this node heads its parent's child list
    pub fn is_first_child(&self) -> bool {
        self.prev_id == self.parent_id
    }

    /// Whether this node currently has at least one child
    pub fn has_children(&self) -> bool {
        self.child_id.is_some()
    }

    /// Whether this node is a folder ("stack")
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    /// The current position of this node expressed as an insertion anchor
    pub fn anchor(&self) -> InsertionAnchor {
        match self.previous_sibling() {
            Some(sibling) => InsertionAnchor::After(sibling.to_string()),
            None => InsertionAnchor::FrontOf(self.parent_id.clone()),
        }
    }

    /// The sibling immediately before this node, if any
    pub fn previous_sibling(&self) -> Option<&str> {
        if self.is_first_child() {
            None
        } else {
            self.prev_id.as_deref()
        }
    }

    /// Snapshot of the four link columns
    pub fn links(&self) -> NodeLinks {
        NodeLinks {
            parent_id: self.parent_id.clone(),
            prev_id: self.prev_id.clone(),
            sibling_id: self.sibling_id.clone(),
            child_id: self.child_id.clone(),
        }
    }
}

/// The structural pointer columns of a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLinks {
    pub parent_id: Option<String>,
    pub prev_id: Option<String>,
    pub sibling_id: Option<String>,
    pub child_id: Option<String>,
}

/// Validate a user supplied title, returning the trimmed value
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let length = trimmed.chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            length,
            max: MAX_TITLE_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

/// Partial node update
///
/// `None` leaves a field untouched. Link fields use `Option<Option<String>>`
/// so a patch can distinguish "unchanged" from "set to null".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub title: Option<String>,
    pub parent_id: Option<Option<String>>,
    pub prev_id: Option<Option<String>>,
    pub sibling_id: Option<Option<String>>,
    pub child_id: Option<Option<String>>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch rewriting all four link columns
    pub fn links(links: NodeLinks) -> Self {
        Self {
            title: None,
            parent_id: Some(links.parent_id),
            prev_id: Some(links.prev_id),
            sibling_id: Some(links.sibling_id),
            child_id: Some(links.child_id),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.parent_id.is_none()
            && self.prev_id.is_none()
            && self.sibling_id.is_none()
            && self.child_id.is_none()
    }

    /// Apply this patch to an in-memory node
    pub fn apply_to(self, node: &mut TreeNode) {
        if let Some(title) = self.title {
            node.title = title;
        }
        if let Some(parent_id) = self.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(prev_id) = self.prev_id {
            node.prev_id = prev_id;
        }
        if let Some(sibling_id) = self.sibling_id {
            node.sibling_id = sibling_id;
        }
        if let Some(child_id) = self.child_id {
            node.child_id = child_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: &TreeNode, prev: Option<&str>) -> TreeNode {
        let mut node = TreeNode::new(&parent.book_id, NodeType::Document, "Child");
        node.parent_id = Some(parent.id.clone());
        node.prev_id = Some(prev.unwrap_or(&parent.id).to_string());
        node
    }

    #[test]
    fn test_new_node_is_detached_root() {
        let node = TreeNode::new("book", NodeType::Document, "Untitled");
        assert!(node.is_root());
        assert!(node.is_first_child());
        assert!(!node.has_children());
        assert!(Uuid::parse_str(&node.id).is_ok());
    }

    #[test]
    fn test_first_child_anchor_uses_parent() {
        let parent = TreeNode::new("book", NodeType::Folder, "F");
        let first = child_of(&parent, None);

        assert!(first.is_first_child());
        assert_eq!(first.previous_sibling(), None);
        assert_eq!(
            first.anchor(),
            InsertionAnchor::FrontOf(Some(parent.id.clone()))
        );
        assert_eq!(first.anchor().prev_id(), Some(parent.id.as_str()));
    }

    #[test]
    fn test_later_sibling_anchor_uses_previous() {
        let parent = TreeNode::new("book", NodeType::Folder, "F");
        let first = child_of(&parent, None);
        let second = child_of(&parent, Some(&first.id));

        assert!(!second.is_first_child());
        assert_eq!(second.previous_sibling(), Some(first.id.as_str()));
        assert_eq!(second.anchor(), InsertionAnchor::After(first.id.clone()));
    }

    #[test]
    fn test_node_type_round_trip() {
        assert_eq!("FOLDER".parse::<NodeType>().unwrap(), NodeType::Folder);
        assert_eq!(NodeType::Document.to_string(), "DOCUMENT");
        assert!(matches!(
            "STACK".parse::<NodeType>(),
            Err(ValidationError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn test_serialized_shape() {
        let node = TreeNode::new("book-9", NodeType::Folder, "Guides");
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["type"], "FOLDER");
        assert_eq!(value["bookId"], "book-9");
        assert!(value["prevId"].is_null());
        assert!(value.get("siblingId").is_some());

        let back: TreeNode = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Intro ").unwrap(), "Intro");
        assert_eq!(validate_title("   "), Err(ValidationError::EmptyTitle));
        let long = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(matches!(
            validate_title(&long),
            Err(ValidationError::TitleTooLong { .. })
        ));
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut node = TreeNode::new("book", NodeType::Document, "Old");
        node.sibling_id = Some("next".to_string());

        NodePatch::new()
            .with_title("New")
            .apply_to(&mut node);

        assert_eq!(node.title, "New");
        assert_eq!(node.sibling_id.as_deref(), Some("next"));

        let mut links = node.links();
        links.sibling_id = None;
        NodePatch::links(links).apply_to(&mut node);
        assert_eq!(node.sibling_id, None);
        assert!(NodePatch::new().is_empty());
    }
}
