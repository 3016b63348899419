//! Database Layer
//!
//! This module handles all catalog persistence using an embedded libsql
//! (Turso) database:
//!
//! - Database initialization and connection management
//! - The `books`, `documents` and `catalog_nodes` tables
//! - The `NodeStore` abstraction and its autocommit/transactional implementations
//! - Domain events broadcast after committed mutations
//!
//! # Architecture
//!
//! Structural edits are never expressed as SQL. The service loads a book's
//! rows through a [`StoreTransaction`], edits them in memory with
//! [`CatalogGraph`](crate::tree::CatalogGraph), and writes the touched rows
//! back before committing.

mod database;
mod error;
pub mod events;
mod node_store;
mod turso_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::CatalogEvent;
pub use node_store::NodeStore;
pub use turso_store::{StoreTransaction, TursoStore};
