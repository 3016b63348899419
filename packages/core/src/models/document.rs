//! Book and document records
//!
//! A `Book` owns one catalog tree. A `Document` is the content payload behind
//! a `DOCUMENT` node; its title is a second copy of the node title.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of hex digits of the document id used as its slug
const SLUG_LENGTH: usize = 12;

/// Top-level container owning one catalog tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

/// Content record backing a document node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub book_id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Allocate an empty document with a slug derived from its id
    pub fn new(book_id: impl Into<String>, title: impl Into<String>) -> Self {
        let uuid = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id: uuid.to_string(),
            book_id: book_id.into(),
            title: title.into(),
            slug: slug_from_id(&uuid),
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derive a URL slug from a document id
pub fn slug_from_id(id: &Uuid) -> String {
    id.simple().to_string()[..SLUG_LENGTH].to_string()
}
