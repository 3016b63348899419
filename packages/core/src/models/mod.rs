//! Data Models
//!
//! - `TreeNode` - one document or folder in a book's catalog tree
//! - `NodePatch` - sparse update for titles and link repairs
//! - `Book` / `Document` - the records the catalog hangs off

mod document;
mod node;

pub use document::{slug_from_id, Book, Document};
pub use node::{
    validate_title, InsertionAnchor, NodeLinks, NodePatch, NodeType, TreeNode, ValidationError,
    MAX_TITLE_LENGTH,
};
