//! Database Connection Management
//!
//! Connection handling and schema initialization for the catalog store,
//! using an embedded libsql/Turso database file.
//!
//! # Architecture
//!
//! - **Path-agnostic**: accepts any writable `PathBuf`
//! - **WAL mode**: readers do not block the single catalog writer
//! - **Foreign keys**: books own their nodes and documents (`ON DELETE CASCADE`)
//! - **Link columns unconstrained**: `parent_id`/`prev_id`/`sibling_id`/`child_id`
//!   carry no foreign keys; keeping them consistent is the mutation protocol's job
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async code. It applies the busy timeout and
//! enables foreign keys, both of which are per-connection settings in SQLite.
//!
//! ```no_run
//! # use inkdesk_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/catalog.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// This will:
    /// 1. Ensure the parent directory exists
    /// 2. Open/create the database file
    /// 3. Create tables and indexes (idempotent)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created, the
    /// connection fails, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::debug!(path = %service.db_path.display(), "catalog database ready");

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        // step once so the pragma takes effect before the handle is reused
        let _ = rows.next().await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create tables and indexes using CREATE ... IF NOT EXISTS
    ///
    /// # Schema
    ///
    /// - `books`: one row per catalog owner
    /// - `documents`: content records behind document nodes
    /// - `catalog_nodes`: the tree rows with their four link columns
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        let statements = [
            (
                "books",
                "CREATE TABLE IF NOT EXISTS books (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
            ),
            (
                "documents",
                "CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    book_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    content TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
                )",
            ),
            (
                "catalog_nodes",
                "CREATE TABLE IF NOT EXISTS catalog_nodes (
                    id TEXT PRIMARY KEY,
                    book_id TEXT NOT NULL,
                    node_type TEXT NOT NULL CHECK (node_type IN ('DOCUMENT', 'FOLDER')),
                    title TEXT NOT NULL,
                    parent_id TEXT,
                    prev_id TEXT,
                    sibling_id TEXT,
                    child_id TEXT,
                    doc_id TEXT,
                    url TEXT,
                    FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
                )",
            ),
            (
                "idx_catalog_nodes_book",
                "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_book ON catalog_nodes(book_id)",
            ),
            (
                "idx_catalog_nodes_parent",
                "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_parent ON catalog_nodes(parent_id)",
            ),
            (
                "idx_catalog_nodes_prev",
                "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_prev ON catalog_nodes(prev_id)",
            ),
            (
                "idx_documents_book",
                "CREATE INDEX IF NOT EXISTS idx_documents_book ON documents(book_id)",
            ),
        ];

        for (name, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create {}: {}", name, e))
            })?;
        }

        // Flush the freshly created schema so a second handle on the same
        // file sees it immediately
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// Prefer `connect_with_timeout()`: a raw handle has neither the busy
    /// timeout nor foreign key enforcement.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        // Wait up to 5s on a locked database instead of failing with SQLITE_BUSY
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }
}
