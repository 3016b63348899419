//! Catalog Events
//!
//! Events emitted by the catalog service after a mutation commits. Other
//! parts of the system (a sync bridge, a cache, a UI shell) can subscribe
//! without coupling to the storage layer.
//!
//! # Event Flow
//!
//! 1. `CatalogService` runs a mutation inside a store transaction
//! 2. The transaction commits
//! 3. The event is sent on a tokio broadcast channel
//! 4. Every subscriber receives it; lagging or absent subscribers never
//!    block or fail the mutation

use crate::models::TreeNode;
use serde::{Deserialize, Serialize};

/// Domain events describing committed catalog changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CatalogEvent {
    /// A node was inserted at the front of its parent
    #[serde(rename_all = "camelCase")]
    NodeCreated { book_id: String, node: TreeNode },

    /// A node's title changed
    #[serde(rename_all = "camelCase")]
    NodeRenamed {
        book_id: String,
        node_id: String,
        title: String,
    },

    /// A node was re-linked; `prev_id` uses the stored encoding
    #[serde(rename_all = "camelCase")]
    NodeMoved {
        book_id: String,
        node_id: String,
        parent_id: Option<String>,
        prev_id: Option<String>,
    },

    /// A node and all of its descendants were removed
    #[serde(rename_all = "camelCase")]
    SubtreeDeleted {
        book_id: String,
        node_ids: Vec<String>,
    },
}

impl CatalogEvent {
    /// Get a string representation of the event type, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::NodeCreated { .. } => "node_created",
            CatalogEvent::NodeRenamed { .. } => "node_renamed",
            CatalogEvent::NodeMoved { .. } => "node_moved",
            CatalogEvent::SubtreeDeleted { .. } => "subtree_deleted",
        }
    }

    pub fn book_id(&self) -> &str {
        match self {
            CatalogEvent::NodeCreated { book_id, .. }
            | CatalogEvent::NodeRenamed { book_id, .. }
            | CatalogEvent::NodeMoved { book_id, .. }
            | CatalogEvent::SubtreeDeleted { book_id, .. } => book_id,
        }
    }
}
