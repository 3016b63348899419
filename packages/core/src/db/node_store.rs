//! NodeStore Trait - Catalog Persistence Abstraction
//!
//! `NodeStore` is the seam between the catalog service (the mutation
//! protocol) and the libsql tables. Two implementations exist:
//!
//! - [`TursoStore`](crate::db::TursoStore): each call runs on its own
//!   connection in autocommit mode
//! - [`StoreTransaction`](crate::db::StoreTransaction): every call runs on
//!   one connection inside `BEGIN IMMEDIATE`, so a whole mutation commits or
//!   rolls back as a unit
//!
//! The service is written against the trait, so reads and writes inside a
//! mutation look exactly like reads outside one.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: libsql is async, so every method is too
//! 2. **Borrowed inputs**: writes take `&TreeNode`/`&Document`; the caller keeps ownership
//! 3. **Error Handling**: `anyhow::Result` with context; the service maps failures
//!    into its own error enum
//! 4. **Full-row writes**: structural edits are computed in memory and written
//!    back with [`NodeStore::write_node`]; [`NodeStore::patch_node`] layers sparse
//!    updates on top of it
//!
//! # Examples
//!
//! ```rust,no_run
//! use inkdesk_core::db::{DatabaseService, NodeStore, TursoStore};
//! use inkdesk_core::models::{Book, NodeType, TreeNode};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/catalog.db")).await?);
//!     let store = TursoStore::new(db);
//!
//!     let book = Book::new("Handbook");
//!     store.create_book(&book).await?;
//!     store
//!         .insert_node(&TreeNode::new(&book.id, NodeType::Folder, "Guides"))
//!         .await?;
//!
//!     let nodes = store.list_nodes(&book.id).await?;
//!     assert_eq!(nodes.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::models::{Book, Document, NodePatch, TreeNode};
use anyhow::Result;
use async_trait::async_trait;

/// Persistence operations for books, catalog nodes and documents
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so stores can be shared across
/// tasks behind an `Arc`.
///
/// # Method Categories
///
/// - **Books**: `create_book`, `get_book`, `list_books`
/// - **Nodes**: `list_nodes`, `get_node`, `insert_node`, `write_node`,
///   `patch_node`, `delete_node`
/// - **Documents**: `insert_document`, `get_document`,
///   `update_document_title`, `delete_document`
#[async_trait]
pub trait NodeStore: Send + Sync {
    //
    // BOOKS
    //

    async fn create_book(&self, book: &Book) -> Result<()>;

    async fn get_book(&self, id: &str) -> Result<Option<Book>>;

    /// All books, oldest first
    async fn list_books(&self) -> Result<Vec<Book>>;

    async fn book_exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_book(id).await?.is_some())
    }

    //
    // NODES
    //

    /// Every node of a book, in storage order (not tree order)
    async fn list_nodes(&self, book_id: &str) -> Result<Vec<TreeNode>>;

    async fn get_node(&self, id: &str) -> Result<Option<TreeNode>>;

    async fn insert_node(&self, node: &TreeNode) -> Result<()>;

    /// Overwrite the mutable columns of an existing node
    ///
    /// `id`, `book_id`, `node_type` and `doc_id` are never rewritten.
    /// Returns `false` if no row matched.
    async fn write_node(&self, node: &TreeNode) -> Result<bool>;

    /// Apply a sparse update, returning the node as stored afterwards
    ///
    /// Returns `Ok(None)` when the node does not exist.
    async fn patch_node(&self, id: &str, patch: NodePatch) -> Result<Option<TreeNode>> {
        let Some(mut node) = self.get_node(id).await? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(node));
        }
        patch.apply_to(&mut node);
        self.write_node(&node).await?;
        Ok(Some(node))
    }

    /// Remove a single row; pointer repair is the caller's job
    async fn delete_node(&self, id: &str) -> Result<bool>;

    //
    // DOCUMENTS
    //

    async fn insert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Mirror a renamed node's title into its document, bumping `updated_at`
    async fn update_document_title(&self, id: &str, title: &str) -> Result<bool>;

    async fn delete_document(&self, id: &str) -> Result<bool>;
}
