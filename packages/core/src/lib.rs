//! Inkdesk Core - Catalog Tree Engine
//!
//! Maintains the user-reorderable catalog tree of each book (documents and
//! folders) and the client-side model that previews drag-and-drop edits
//! before the server confirms them.
//!
//! # Architecture
//!
//! - **Linked siblings**: order is stored as `parent_id`/`prev_id`/`sibling_id`/`child_id`
//!   pointers, so moving one node is a constant number of row patches
//! - **One algebra**: [`tree::CatalogGraph`] implements detach/attach/remove once;
//!   the server and the optimistic client both run it
//! - **Whole-list answers**: every mutation returns the freshly projected
//!   catalog, and clients replace their view wholesale
//! - **libsql/Turso**: embedded SQLite-compatible storage, one transaction per mutation
//!
//! # Modules
//!
//! - [`models`] - `TreeNode`, `Book`, `Document` and validation
//! - [`tree`] - pointer algebra, projection and invariant checks
//! - [`db`] - database layer with libsql integration
//! - [`services`] - `CatalogService`, the transactional mutation protocol
//! - [`client`] - optimistic replica and drag resolution
//! - [`config`] - `CatalogConfig`
//! - [`logging`] - tracing subscriber setup

pub mod client;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use client::{CatalogBackend, DragController, OptimisticCatalog, TreeOperation};
pub use config::CatalogConfig;
pub use models::*;
pub use services::{CatalogService, CatalogServiceError};
pub use tree::{project, CatalogGraph, ProjectedNode};
