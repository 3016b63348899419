//! Catalog Service - Tree Mutation Protocol
//!
//! The only component that rewrites structural links in storage. Every
//! mutation follows the same shape:
//!
//! 1. open a `StoreTransaction` (`BEGIN IMMEDIATE`)
//! 2. load the book's rows into a [`CatalogGraph`]
//! 3. apply the pointer algebra in memory (detach, attach, remove subtree)
//! 4. write back only the rows the graph marked as touched
//! 5. re-list and project the book inside the same transaction
//! 6. commit, then broadcast a [`CatalogEvent`]
//!
//! Any error before the commit rolls the whole transaction back, so callers
//! never observe a half-applied pointer patch.
//!
//! # Unsafe targets
//!
//! A move whose anchor or target parent no longer exists (typically because
//! a concurrent request deleted it) is not an error: nothing is written and
//! the current catalog is returned. A move whose subject node is missing is
//! [`CatalogServiceError::NodeNotFound`].

use crate::config::CatalogConfig;
use crate::db::{CatalogEvent, DatabaseService, NodeStore, StoreTransaction, TursoStore};
use crate::models::{validate_title, Book, Document, NodeType, TreeNode};
use crate::services::error::CatalogServiceError;
use crate::tree::{check_invariants, project, CatalogGraph, GraphChanges, MoveOutcome, ProjectedNode};
use std::sync::Arc;
use tokio::sync::broadcast;

type Result<T> = std::result::Result<T, CatalogServiceError>;

fn store_err(e: anyhow::Error) -> CatalogServiceError {
    CatalogServiceError::query_failed(format!("{:#}", e))
}

/// Rows returned by a committed mutation plus the event to announce it
struct Mutation<T> {
    value: T,
    event: Option<CatalogEvent>,
}

impl<T> Mutation<T> {
    fn quiet(value: T) -> Self {
        Self { value, event: None }
    }

    fn announce(value: T, event: CatalogEvent) -> Self {
        Self {
            value,
            event: Some(event),
        }
    }
}

/// Catalog operations over one libsql database
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<TursoStore>,
    config: CatalogConfig,
    event_tx: broadcast::Sender<CatalogEvent>,
}

impl CatalogService {
    /// Create a service with default configuration
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use inkdesk_core::db::{DatabaseService, TursoStore};
    /// # use inkdesk_core::services::CatalogService;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Arc::new(DatabaseService::new("./data/catalog.db".into()).await?);
    /// let service = CatalogService::new(Arc::new(TursoStore::new(db)));
    /// let book = service.create_book("Handbook").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(store: Arc<TursoStore>) -> Self {
        Self::with_config(store, CatalogConfig::default())
    }

    pub fn with_config(store: Arc<TursoStore>, config: CatalogConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            config,
            event_tx,
        }
    }

    /// Validate `config`, open its database and build a service over it
    pub async fn open(config: CatalogConfig) -> Result<Self> {
        config
            .validate()
            .map_err(CatalogServiceError::invalid_config)?;
        let db = DatabaseService::new(config.db_path.clone()).await?;
        Ok(Self::with_config(
            Arc::new(TursoStore::new(Arc::new(db))),
            config,
        ))
    }

    pub fn store(&self) -> &Arc<TursoStore> {
        &self.store
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Subscribe to events for committed mutations
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors: having no subscribers is normal
    fn emit_event(&self, event: CatalogEvent) {
        tracing::debug!("emitting {} for book {}", event.event_type(), event.book_id());
        let _ = self.event_tx.send(event);
    }

    async fn begin(&self) -> Result<StoreTransaction> {
        self.store
            .begin()
            .await
            .map_err(|e| CatalogServiceError::transaction_failed(format!("{:#}", e)))
    }

    /// Commit on success, roll back on failure, then announce
    async fn finish<T>(
        &self,
        operation: &str,
        tx: StoreTransaction,
        result: Result<Mutation<T>>,
    ) -> Result<T> {
        match result {
            Ok(mutation) => {
                tx.commit().await.map_err(|e| {
                    CatalogServiceError::transaction_failed(format!("{} commit: {:#}", operation, e))
                })?;
                if let Some(event) = mutation.event {
                    tracing::info!("{} committed", operation);
                    self.emit_event(event);
                }
                Ok(mutation.value)
            }
            Err(err) => {
                tracing::warn!("{} rolled back: {}", operation, err);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("{} rollback failed: {:#}", operation, rollback_err);
                }
                Err(err)
            }
        }
    }

    //
    // BOOKS
    //

    pub async fn create_book(&self, title: &str) -> Result<Book> {
        let book = Book::new(validate_title(title)?);
        self.store.create_book(&book).await.map_err(store_err)?;
        tracing::info!("created book '{}' ({})", book.title, book.id);
        Ok(book)
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.store.list_books().await.map_err(store_err)
    }

    //
    // READS
    //

    /// The book's catalog, flattened in pre-order with depth levels
    pub async fn catalog(&self, book_id: &str) -> Result<Vec<ProjectedNode>> {
        ensure_book(self.store.as_ref(), book_id).await?;
        project_book(self.store.as_ref(), book_id).await
    }

    /// Run the invariant checker over the stored rows of a book
    pub async fn check_integrity(&self, book_id: &str) -> Result<()> {
        ensure_book(self.store.as_ref(), book_id).await?;
        let nodes = self.store.list_nodes(book_id).await.map_err(store_err)?;
        check_invariants(&nodes)?;
        Ok(())
    }

    //
    // MUTATIONS
    //

    /// Create a node with the configured default title at the front of
    /// `parent_id`'s children (`None` = book root)
    pub async fn create_node(
        &self,
        book_id: &str,
        node_type: NodeType,
        parent_id: Option<&str>,
    ) -> Result<TreeNode> {
        let title = match node_type {
            NodeType::Document => self.config.titles.document.clone(),
            NodeType::Folder => self.config.titles.folder.clone(),
        };
        self.create_node_with_title(book_id, node_type, parent_id, &title)
            .await
    }

    /// Like [`create_node`](Self::create_node) with an explicit title
    ///
    /// Document nodes get a backing document record whose slug becomes the
    /// node's `url`.
    pub async fn create_node_with_title(
        &self,
        book_id: &str,
        node_type: NodeType,
        parent_id: Option<&str>,
        title: &str,
    ) -> Result<TreeNode> {
        let title = validate_title(title)?;
        let tx = self.begin().await?;
        let result = create_in(&tx, book_id, node_type, parent_id, title).await;
        self.finish("create_node", tx, result).await
    }

    /// Remove a node, its whole subtree and their backing documents
    pub async fn delete_with_children(&self, node_id: &str) -> Result<Vec<ProjectedNode>> {
        let tx = self.begin().await?;
        let result = delete_in(&tx, node_id).await;
        self.finish("delete_with_children", tx, result).await
    }

    /// Make `node_id` the first child of `new_parent_id` (`None` = first root)
    pub async fn move_to_front(
        &self,
        book_id: &str,
        node_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Vec<ProjectedNode>> {
        let tx = self.begin().await?;
        let result = move_in(&tx, book_id, node_id, MoveTarget::FrontOf(new_parent_id)).await;
        self.finish("move_to_front", tx, result).await
    }

    /// Place `node_id` immediately after `after_id`, adopting its parent
    pub async fn move_after(
        &self,
        book_id: &str,
        node_id: &str,
        after_id: &str,
    ) -> Result<Vec<ProjectedNode>> {
        let tx = self.begin().await?;
        let result = move_in(&tx, book_id, node_id, MoveTarget::After(after_id)).await;
        self.finish("move_after", tx, result).await
    }

    /// Rename a node and mirror the title into its backing document
    pub async fn update_title(&self, node_id: &str, title: &str) -> Result<Vec<ProjectedNode>> {
        let title = validate_title(title)?;
        let tx = self.begin().await?;
        let result = rename_in(&tx, node_id, title).await;
        self.finish("update_title", tx, result).await
    }
}

#[derive(Debug, Clone, Copy)]
enum MoveTarget<'a> {
    FrontOf(Option<&'a str>),
    After(&'a str),
}

async fn ensure_book(store: &dyn NodeStore, book_id: &str) -> Result<()> {
    if store.book_exists(book_id).await.map_err(store_err)? {
        Ok(())
    } else {
        Err(CatalogServiceError::book_not_found(book_id))
    }
}

async fn project_book(store: &dyn NodeStore, book_id: &str) -> Result<Vec<ProjectedNode>> {
    let nodes = store.list_nodes(book_id).await.map_err(store_err)?;
    Ok(project(&nodes)?)
}

async fn load_graph(store: &dyn NodeStore, book_id: &str) -> Result<CatalogGraph> {
    ensure_book(store, book_id).await?;
    let nodes = store.list_nodes(book_id).await.map_err(store_err)?;
    Ok(CatalogGraph::from_nodes(nodes))
}

/// Persist a graph's touched rows; `created` names a row that is new
async fn write_changes(
    store: &dyn NodeStore,
    changes: GraphChanges,
    created: Option<&str>,
) -> Result<()> {
    for id in &changes.removed {
        store.delete_node(id).await.map_err(store_err)?;
    }
    for node in &changes.updated {
        if Some(node.id.as_str()) == created {
            store.insert_node(node).await.map_err(store_err)?;
        } else if !store.write_node(node).await.map_err(store_err)? {
            return Err(CatalogServiceError::node_not_found(&node.id));
        }
    }
    Ok(())
}

async fn create_in(
    tx: &StoreTransaction,
    book_id: &str,
    node_type: NodeType,
    parent_id: Option<&str>,
    title: String,
) -> Result<Mutation<TreeNode>> {
    let mut graph = load_graph(tx, book_id).await?;
    if let Some(parent_id) = parent_id {
        if !graph.contains(parent_id) {
            return Err(CatalogServiceError::invalid_parent(parent_id));
        }
    }

    let mut node = TreeNode::new(book_id, node_type, title);
    if node_type == NodeType::Document {
        let document = Document::new(book_id, node.title.clone());
        tx.insert_document(&document).await.map_err(store_err)?;
        node = node.with_document(document.id, document.slug);
    }

    let node_id = node.id.clone();
    graph.insert_front(node, parent_id)?;
    write_changes(tx, graph.take_changes(), Some(&node_id)).await?;

    let created = graph
        .get(&node_id)
        .cloned()
        .ok_or_else(|| CatalogServiceError::node_not_found(&node_id))?;
    tracing::info!(
        "created {} '{}' under {:?}",
        created.node_type,
        created.title,
        created.parent_id
    );
    let event = CatalogEvent::NodeCreated {
        book_id: book_id.to_string(),
        node: created.clone(),
    };
    Ok(Mutation::announce(created, event))
}

async fn delete_in(tx: &StoreTransaction, node_id: &str) -> Result<Mutation<Vec<ProjectedNode>>> {
    let node = tx
        .get_node(node_id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| CatalogServiceError::node_not_found(node_id))?;
    let book_id = node.book_id;

    let mut graph = load_graph(tx, &book_id).await?;
    let removed = graph.remove_subtree(node_id)?;
    write_changes(tx, graph.take_changes(), None).await?;

    for doc_id in removed.iter().filter_map(|n| n.doc_id.as_deref()) {
        tx.delete_document(doc_id).await.map_err(store_err)?;
    }

    tracing::info!(
        "deleted node {} with {} descendant(s)",
        node_id,
        removed.len().saturating_sub(1)
    );
    let rows = project_book(tx, &book_id).await?;
    let event = CatalogEvent::SubtreeDeleted {
        book_id,
        node_ids: removed.into_iter().map(|n| n.id).collect(),
    };
    Ok(Mutation::announce(rows, event))
}

async fn move_in(
    tx: &StoreTransaction,
    book_id: &str,
    node_id: &str,
    target: MoveTarget<'_>,
) -> Result<Mutation<Vec<ProjectedNode>>> {
    let node = tx
        .get_node(node_id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| CatalogServiceError::node_not_found(node_id))?;
    if node.book_id != book_id {
        return Err(CatalogServiceError::invalid_move(
            node_id,
            format!("node belongs to book {}, not {}", node.book_id, book_id),
        ));
    }

    let mut graph = load_graph(tx, book_id).await?;
    let outcome = match target {
        MoveTarget::FrontOf(parent) => graph.move_to_front(node_id, parent)?,
        MoveTarget::After(after_id) => graph.move_after(node_id, after_id)?,
    };

    let event = match outcome {
        MoveOutcome::Applied => {
            write_changes(tx, graph.take_changes(), None).await?;
            let moved = graph
                .get(node_id)
                .ok_or_else(|| CatalogServiceError::node_not_found(node_id))?;
            tracing::info!(
                "moved node {} to parent {:?} after {:?}",
                node_id,
                moved.parent_id,
                moved.previous_sibling()
            );
            Some(CatalogEvent::NodeMoved {
                book_id: book_id.to_string(),
                node_id: node_id.to_string(),
                parent_id: moved.parent_id.clone(),
                prev_id: moved.prev_id.clone(),
            })
        }
        MoveOutcome::AlreadyInPlace => {
            tracing::debug!("node {} already in place, nothing to move", node_id);
            None
        }
        MoveOutcome::MissingTarget { target_id } => {
            // a target stored under another book is a bad request, not a race
            if tx.get_node(&target_id).await.map_err(store_err)?.is_some() {
                return Err(CatalogServiceError::invalid_move(
                    node_id,
                    format!("target {} belongs to another book", target_id),
                ));
            }
            tracing::warn!(
                "move target {} no longer exists; node {} left in place",
                target_id,
                node_id
            );
            None
        }
    };

    let rows = project_book(tx, book_id).await?;
    Ok(match event {
        Some(event) => Mutation::announce(rows, event),
        None => Mutation::quiet(rows),
    })
}

async fn rename_in(
    tx: &StoreTransaction,
    node_id: &str,
    title: String,
) -> Result<Mutation<Vec<ProjectedNode>>> {
    let node = tx
        .get_node(node_id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| CatalogServiceError::node_not_found(node_id))?;

    let mut graph = CatalogGraph::from_nodes([node.clone()]);
    if !graph.rename(node_id, &title)? {
        tracing::debug!("node {} already titled '{}'", node_id, title);
        return Ok(Mutation::quiet(project_book(tx, &node.book_id).await?));
    }
    write_changes(tx, graph.take_changes(), None).await?;

    if let Some(doc_id) = node.doc_id.as_deref() {
        if !tx
            .update_document_title(doc_id, &title)
            .await
            .map_err(store_err)?
        {
            tracing::warn!("node {} references missing document {}", node_id, doc_id);
        }
    }

    let rows = project_book(tx, &node.book_id).await?;
    let event = CatalogEvent::NodeRenamed {
        book_id: node.book_id,
        node_id: node_id.to_string(),
        title,
    };
    Ok(Mutation::announce(rows, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_service() -> (CatalogService, Book, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let service = CatalogService::new(Arc::new(TursoStore::new(Arc::new(db))));
        let book = service.create_book("Handbook").await.unwrap();
        (service, book, temp_dir)
    }

    fn titles(rows: &[ProjectedNode]) -> Vec<(&str, usize)> {
        rows.iter()
            .map(|r| (r.node.title.as_str(), r.level))
            .collect()
    }

    #[tokio::test]
    async fn test_create_node_inserts_at_front() {
        let (service, book, _temp_dir) = create_test_service().await;

        let first = service
            .create_node(&book.id, NodeType::Document, None)
            .await
            .unwrap();
        let folder = service
            .create_node(&book.id, NodeType::Folder, None)
            .await
            .unwrap();

        let rows = service.catalog(&book.id).await.unwrap();
        assert_eq!(titles(&rows), vec![("New Folder", 0), ("Untitled", 0)]);
        assert!(first.doc_id.is_some());
        assert_eq!(first.url.as_ref().map(String::len), Some(12));
        assert!(folder.doc_id.is_none());
        assert!(folder.url.is_none());
    }

    #[tokio::test]
    async fn test_create_node_backs_documents() {
        let (service, book, _temp_dir) = create_test_service().await;

        let node = service
            .create_node_with_title(&book.id, NodeType::Document, None, "Intro")
            .await
            .unwrap();

        let doc_id = node.doc_id.clone().unwrap();
        let doc = service.store().get_document(&doc_id).await.unwrap().unwrap();
        assert_eq!(doc.title, "Intro");
        assert_eq!(Some(doc.slug), node.url);
    }

    #[tokio::test]
    async fn test_create_node_rejects_unknown_book_and_parent() {
        let (service, book, _temp_dir) = create_test_service().await;

        let err = service
            .create_node("missing", NodeType::Folder, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogServiceError::BookNotFound { .. }));

        let err = service
            .create_node(&book.id, NodeType::Folder, Some("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogServiceError::InvalidParent { .. }));
        assert!(service.catalog(&book.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_surface() {
        let (service, book, _temp_dir) = create_test_service().await;
        let node = service
            .create_node(&book.id, NodeType::Folder, None)
            .await
            .unwrap();

        let err = service.update_title(&node.id, "   ").await.unwrap_err();
        assert!(matches!(err, CatalogServiceError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_events_follow_commits() {
        let (service, book, _temp_dir) = create_test_service().await;
        let mut events = service.subscribe();

        let node = service
            .create_node(&book.id, NodeType::Folder, None)
            .await
            .unwrap();
        service.update_title(&node.id, "Guides").await.unwrap();
        service.delete_with_children(&node.id).await.unwrap();

        assert_eq!(events.recv().await.unwrap().event_type(), "node_created");
        assert_eq!(events.recv().await.unwrap().event_type(), "node_renamed");
        match events.recv().await.unwrap() {
            CatalogEvent::SubtreeDeleted { node_ids, .. } => assert_eq!(node_ids, vec![node.id]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_noop_move_emits_nothing() {
        let (service, book, _temp_dir) = create_test_service().await;
        let node = service
            .create_node(&book.id, NodeType::Folder, None)
            .await
            .unwrap();
        let mut events = service.subscribe();

        service.move_to_front(&book.id, &node.id, None).await.unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_check_integrity_on_fresh_book() {
        let (service, book, _temp_dir) = create_test_service().await;
        let folder = service
            .create_node(&book.id, NodeType::Folder, None)
            .await
            .unwrap();
        service
            .create_node(&book.id, NodeType::Document, Some(&folder.id))
            .await
            .unwrap();

        service.check_integrity(&book.id).await.unwrap();
        assert!(matches!(
            service.check_integrity("missing").await,
            Err(CatalogServiceError::BookNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        let mut config = CatalogConfig {
            db_path: db_path.clone(),
            ..CatalogConfig::default()
        };
        config.drag.indent_width = 0.0;

        let err = CatalogService::open(config).await.err().unwrap();

        assert!(matches!(err, CatalogServiceError::InvalidConfig { .. }));
        assert!(!db_path.exists(), "no database is opened for a bad config");
    }
}
