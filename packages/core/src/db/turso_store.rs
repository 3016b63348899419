//! TursoStore - NodeStore Implementation for the libsql Backend
//!
//! Two stores share one set of SQL helpers that run against a borrowed
//! `libsql::Connection`:
//!
//! - [`TursoStore`] opens a fresh connection per call (autocommit)
//! - [`StoreTransaction`] keeps a single connection open between
//!   `BEGIN IMMEDIATE` and `COMMIT`/`ROLLBACK`
//!
//! `BEGIN IMMEDIATE` takes the write lock up front, so two concurrent
//! catalog mutations serialize on the busy timeout instead of interleaving
//! their read-modify-write cycles.
//!
//! # Examples
//!
//! ```rust,no_run
//! use inkdesk_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/catalog.db")).await?);
//!     let store = TursoStore::new(db);
//!
//!     let tx = store.begin().await?;
//!     let node = tx.get_node("node-123").await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use crate::db::error::DatabaseError;
use crate::db::node_store::NodeStore;
use crate::db::DatabaseService;
use crate::models::{Book, Document, NodeType, TreeNode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row};
use std::sync::Arc;

const NODE_COLUMNS: &str =
    "id, book_id, node_type, title, parent_id, prev_id, sibling_id, child_id, doc_id, url";

const DOCUMENT_COLUMNS: &str = "id, book_id, title, slug, content, created_at, updated_at";

/// NodeStore over libsql, one connection per call
#[derive(Debug, Clone)]
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Underlying database service
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.db.connect_with_timeout().await?)
    }

    /// Open a write transaction on a dedicated connection
    ///
    /// The returned handle implements [`NodeStore`]; all of its reads see
    /// its own uncommitted writes.
    pub async fn begin(&self) -> Result<StoreTransaction> {
        let conn = self.conn().await?;
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e)))?;
        Ok(StoreTransaction {
            conn,
            finished: false,
        })
    }
}

/// A write transaction that implements [`NodeStore`]
///
/// Call [`commit`](StoreTransaction::commit) or
/// [`rollback`](StoreTransaction::rollback). Dropping an unfinished
/// transaction closes its connection, which makes SQLite discard the
/// uncommitted writes.
pub struct StoreTransaction {
    conn: Connection,
    finished: bool,
}

impl StoreTransaction {
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to roll back: {}", e)))?;
        Ok(())
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("catalog transaction dropped without commit; changes discarded");
        }
    }
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
///
/// SQLite CURRENT_TIMESTAMP returns "YYYY-MM-DD HH:MM:SS"; rows written by
/// this crate use RFC3339.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(anyhow::anyhow!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    ))
}

/// Convert a `catalog_nodes` row (selected with `NODE_COLUMNS`) into a node
fn row_to_node(row: &Row) -> Result<TreeNode> {
    let id: String = row.get(0).context("Failed to get id")?;
    let book_id: String = row.get(1).context("Failed to get book_id")?;
    let node_type: String = row.get(2).context("Failed to get node_type")?;
    let title: String = row.get(3).context("Failed to get title")?;
    let parent_id: Option<String> = row.get(4).context("Failed to get parent_id")?;
    let prev_id: Option<String> = row.get(5).context("Failed to get prev_id")?;
    let sibling_id: Option<String> = row.get(6).context("Failed to get sibling_id")?;
    let child_id: Option<String> = row.get(7).context("Failed to get child_id")?;
    let doc_id: Option<String> = row.get(8).context("Failed to get doc_id")?;
    let url: Option<String> = row.get(9).context("Failed to get url")?;

    let node_type: NodeType = node_type
        .parse()
        .map_err(|e| DatabaseError::invalid_row("catalog_nodes", format!("{}: {}", id, e)))?;

    Ok(TreeNode {
        id,
        book_id,
        node_type,
        title,
        parent_id,
        prev_id,
        sibling_id,
        child_id,
        doc_id,
        url,
    })
}

fn row_to_document(row: &Row) -> Result<Document> {
    let created_at: String = row.get(5).context("Failed to get created_at")?;
    let updated_at: String = row.get(6).context("Failed to get updated_at")?;

    Ok(Document {
        id: row.get(0).context("Failed to get id")?,
        book_id: row.get(1).context("Failed to get book_id")?,
        title: row.get(2).context("Failed to get title")?,
        slug: row.get(3).context("Failed to get slug")?,
        content: row.get(4).context("Failed to get content")?,
        created_at: parse_timestamp(&created_at).context("Failed to parse created_at")?,
        updated_at: parse_timestamp(&updated_at).context("Failed to parse updated_at")?,
    })
}

fn row_to_book(row: &Row) -> Result<Book> {
    let created_at: String = row.get(2).context("Failed to get created_at")?;
    Ok(Book {
        id: row.get(0).context("Failed to get id")?,
        title: row.get(1).context("Failed to get title")?,
        created_at: parse_timestamp(&created_at).context("Failed to parse created_at")?,
    })
}

/// SQL shared by both store flavours
mod sql {
    use super::*;

    pub(super) async fn create_book(conn: &Connection, book: &Book) -> Result<()> {
        conn.execute(
            "INSERT INTO books (id, title, created_at) VALUES (?, ?, ?)",
            (
                book.id.as_str(),
                book.title.as_str(),
                book.created_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert book: {}", e)))?;
        Ok(())
    }

    pub(super) async fn get_book(conn: &Connection, id: &str) -> Result<Option<Book>> {
        let mut rows = conn
            .query("SELECT id, title, created_at FROM books WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query book: {}", e)))?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_book(&row)?)),
            None => Ok(None),
        }
    }

    pub(super) async fn list_books(conn: &Connection) -> Result<Vec<Book>> {
        let mut rows = conn
            .query(
                "SELECT id, title, created_at FROM books ORDER BY created_at, id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to list books: {}", e)))?;
        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }
        Ok(books)
    }

    pub(super) async fn list_nodes(conn: &Connection, book_id: &str) -> Result<Vec<TreeNode>> {
        let query = format!(
            "SELECT {} FROM catalog_nodes WHERE book_id = ? ORDER BY rowid",
            NODE_COLUMNS
        );
        let mut rows = conn
            .query(&query, [book_id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to list nodes: {}", e)))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    pub(super) async fn get_node(conn: &Connection, id: &str) -> Result<Option<TreeNode>> {
        let query = format!("SELECT {} FROM catalog_nodes WHERE id = ?", NODE_COLUMNS);
        let mut rows = conn
            .query(&query, [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query node: {}", e)))?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    pub(super) async fn insert_node(conn: &Connection, node: &TreeNode) -> Result<()> {
        conn.execute(
            "INSERT INTO catalog_nodes
                (id, book_id, node_type, title, parent_id, prev_id, sibling_id, child_id, doc_id, url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                node.id.as_str(),
                node.book_id.as_str(),
                node.node_type.as_str(),
                node.title.as_str(),
                node.parent_id.as_deref(),
                node.prev_id.as_deref(),
                node.sibling_id.as_deref(),
                node.child_id.as_deref(),
                node.doc_id.as_deref(),
                node.url.as_deref(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;
        Ok(())
    }

    pub(super) async fn write_node(conn: &Connection, node: &TreeNode) -> Result<bool> {
        let affected = conn
            .execute(
                "UPDATE catalog_nodes
                 SET title = ?, parent_id = ?, prev_id = ?, sibling_id = ?, child_id = ?, url = ?
                 WHERE id = ?",
                (
                    node.title.as_str(),
                    node.parent_id.as_deref(),
                    node.prev_id.as_deref(),
                    node.sibling_id.as_deref(),
                    node.child_id.as_deref(),
                    node.url.as_deref(),
                    node.id.as_str(),
                ),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to update node: {}", e)))?;
        Ok(affected > 0)
    }

    pub(super) async fn delete_node(conn: &Connection, id: &str) -> Result<bool> {
        let affected = conn
            .execute("DELETE FROM catalog_nodes WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node: {}", e)))?;
        Ok(affected > 0)
    }

    pub(super) async fn insert_document(conn: &Connection, document: &Document) -> Result<()> {
        conn.execute(
            "INSERT INTO documents (id, book_id, title, slug, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                document.id.as_str(),
                document.book_id.as_str(),
                document.title.as_str(),
                document.slug.as_str(),
                document.content.as_str(),
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert document: {}", e)))?;
        Ok(())
    }

    pub(super) async fn get_document(conn: &Connection, id: &str) -> Result<Option<Document>> {
        let query = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let mut rows = conn.query(&query, [id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to query document: {}", e))
        })?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    pub(super) async fn update_document_title(
        conn: &Connection,
        id: &str,
        title: &str,
    ) -> Result<bool> {
        let affected = conn
            .execute(
                "UPDATE documents SET title = ?, updated_at = ? WHERE id = ?",
                (title, Utc::now().to_rfc3339(), id),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to update document title: {}", e))
            })?;
        Ok(affected > 0)
    }

    pub(super) async fn delete_document(conn: &Connection, id: &str) -> Result<bool> {
        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?", [id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to delete document: {}", e))
            })?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn create_book(&self, book: &Book) -> Result<()> {
        sql::create_book(&self.conn().await?, book).await
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>> {
        sql::get_book(&self.conn().await?, id).await
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        sql::list_books(&self.conn().await?).await
    }

    async fn list_nodes(&self, book_id: &str) -> Result<Vec<TreeNode>> {
        sql::list_nodes(&self.conn().await?, book_id).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<TreeNode>> {
        sql::get_node(&self.conn().await?, id).await
    }

    async fn insert_node(&self, node: &TreeNode) -> Result<()> {
        sql::insert_node(&self.conn().await?, node).await
    }

    async fn write_node(&self, node: &TreeNode) -> Result<bool> {
        sql::write_node(&self.conn().await?, node).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        sql::delete_node(&self.conn().await?, id).await
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        sql::insert_document(&self.conn().await?, document).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        sql::get_document(&self.conn().await?, id).await
    }

    async fn update_document_title(&self, id: &str, title: &str) -> Result<bool> {
        sql::update_document_title(&self.conn().await?, id, title).await
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        sql::delete_document(&self.conn().await?, id).await
    }
}

#[async_trait]
impl NodeStore for StoreTransaction {
    async fn create_book(&self, book: &Book) -> Result<()> {
        sql::create_book(&self.conn, book).await
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>> {
        sql::get_book(&self.conn, id).await
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        sql::list_books(&self.conn).await
    }

    async fn list_nodes(&self, book_id: &str) -> Result<Vec<TreeNode>> {
        sql::list_nodes(&self.conn, book_id).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<TreeNode>> {
        sql::get_node(&self.conn, id).await
    }

    async fn insert_node(&self, node: &TreeNode) -> Result<()> {
        sql::insert_node(&self.conn, node).await
    }

    async fn write_node(&self, node: &TreeNode) -> Result<bool> {
        sql::write_node(&self.conn, node).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        sql::delete_node(&self.conn, id).await
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        sql::insert_document(&self.conn, document).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        sql::get_document(&self.conn, id).await
    }

    async fn update_document_title(&self, id: &str, title: &str) -> Result<bool> {
        sql::update_document_title(&self.conn, id, title).await
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        sql::delete_document(&self.conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodePatch, NodeType};
    use tempfile::TempDir;

    async fn create_test_store() -> (TursoStore, Book, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let store = TursoStore::new(Arc::new(db));
        let book = Book::new("Handbook");
        store.create_book(&book).await.unwrap();
        (store, book, temp_dir)
    }

    #[tokio::test]
    async fn test_book_round_trip() {
        let (store, book, _temp_dir) = create_test_store().await;

        let loaded = store.get_book(&book.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Handbook");
        assert!(store.book_exists(&book.id).await.unwrap());
        assert!(!store.book_exists("missing").await.unwrap());
        assert_eq!(store.list_books().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_node_insert_and_read_back() {
        let (store, book, _temp_dir) = create_test_store().await;
        let mut node = TreeNode::new(&book.id, NodeType::Document, "Intro");
        node.sibling_id = Some("next".to_string());
        node.url = Some("abc123".to_string());

        store.insert_node(&node).await.unwrap();

        let loaded = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(loaded, node);
        assert_eq!(store.list_nodes(&book.id).await.unwrap(), vec![node]);
        assert!(store.list_nodes("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_node_updates_only_given_fields() {
        let (store, book, _temp_dir) = create_test_store().await;
        let node = TreeNode::new(&book.id, NodeType::Folder, "Guides");
        store.insert_node(&node).await.unwrap();

        let patched = store
            .patch_node(&node.id, NodePatch::new().with_title("Manuals"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(patched.title, "Manuals");
        assert_eq!(patched.links(), node.links());
        assert!(store
            .patch_node("missing", NodePatch::new().with_title("x"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_node_reports_missing() {
        let (store, book, _temp_dir) = create_test_store().await;
        let node = TreeNode::new(&book.id, NodeType::Folder, "Guides");
        store.insert_node(&node).await.unwrap();

        assert!(store.delete_node(&node.id).await.unwrap());
        assert!(!store.delete_node(&node.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_document_title_update() {
        let (store, book, _temp_dir) = create_test_store().await;
        let doc = Document::new(&book.id, "Untitled");
        store.insert_document(&doc).await.unwrap();

        assert!(store.update_document_title(&doc.id, "Intro").await.unwrap());

        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Intro");
        assert_eq!(loaded.slug, doc.slug);
        assert!(loaded.updated_at >= doc.updated_at);
        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(store.get_document(&doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (store, book, _temp_dir) = create_test_store().await;
        let node = TreeNode::new(&book.id, NodeType::Folder, "Guides");

        let tx = store.begin().await.unwrap();
        tx.insert_node(&node).await.unwrap();
        assert!(tx.get_node(&node.id).await.unwrap().is_some());
        tx.rollback().await.unwrap();

        assert!(store.get_node(&node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let (store, book, _temp_dir) = create_test_store().await;
        let node = TreeNode::new(&book.id, NodeType::Folder, "Guides");

        let tx = store.begin().await.unwrap();
        tx.insert_node(&node).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.get_node(&node.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let (store, book, _temp_dir) = create_test_store().await;
        let node = TreeNode::new(&book.id, NodeType::Folder, "Guides");

        {
            let tx = store.begin().await.unwrap();
            tx.insert_node(&node).await.unwrap();
        }

        assert!(store.get_node(&node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_node_requires_existing_book() {
        let (store, _book, _temp_dir) = create_test_store().await;
        let orphan = TreeNode::new("no-such-book", NodeType::Folder, "Orphan");

        assert!(store.insert_node(&orphan).await.is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-02 03:04:05").is_ok());
        assert!(parse_timestamp("2025-01-02T03:04:05+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
