//! Service Layer Error Types
//!
//! Errors raised by the catalog mutation protocol. Unsafe targets (a move
//! anchor deleted by a concurrent request) are not errors: the service logs
//! them and returns the unchanged catalog.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use crate::tree::{GraphError, IntegrityViolation, ProjectionError};
use thiserror::Error;

/// Catalog service errors
#[derive(Error, Debug)]
pub enum CatalogServiceError {
    /// Book not found by ID
    #[error("Book not found: {id}")]
    BookNotFound { id: String },

    /// The node an operation acts on does not exist
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// The requested parent is missing or owned by another book
    #[error("Invalid parent node: {parent_id}")]
    InvalidParent { parent_id: String },

    /// The move would create a cycle or cross a book boundary
    #[error("Invalid move of {node_id}: {reason}")]
    InvalidMove { node_id: String, reason: String },

    /// Validation failed for the request
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Stored links could not be flattened
    #[error("Catalog projection failed: {0}")]
    ProjectionFailed(#[from] ProjectionError),

    /// Stored links violate a catalog invariant
    #[error("Catalog integrity violated: {0}")]
    IntegrityViolated(#[from] IntegrityViolation),

    /// The service configuration was rejected before opening the database
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Transaction failed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Query execution error
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),
}

impl CatalogServiceError {
    pub fn book_not_found(id: impl Into<String>) -> Self {
        Self::BookNotFound { id: id.into() }
    }

    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn invalid_parent(parent_id: impl Into<String>) -> Self {
        Self::InvalidParent {
            parent_id: parent_id.into(),
        }
    }

    pub fn invalid_move(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMove {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed(msg.into())
    }
}

impl From<GraphError> for CatalogServiceError {
    fn from(err: GraphError) -> Self {
        let reason = err.to_string();
        match err {
            GraphError::NodeNotFound { id } => Self::NodeNotFound { id },
            GraphError::WouldCreateCycle { node_id, .. } | GraphError::CrossBook { node_id, .. } => {
                Self::InvalidMove { node_id, reason }
            }
            GraphError::DanglingLink { node_id, missing_id } => {
                Self::ProjectionFailed(ProjectionError::DanglingLink {
                    node_id,
                    missing_id,
                })
            }
        }
    }
}
