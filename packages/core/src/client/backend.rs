//! The call boundary between the interactive client and the mutation protocol

use crate::services::{CatalogService, CatalogServiceError};
use crate::tree::ProjectedNode;
use async_trait::async_trait;

/// Server-side catalog operations as seen by the client
///
/// Every mutation answers with the book's complete, freshly projected
/// catalog rather than a diff.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn catalog(&self, book_id: &str) -> Result<Vec<ProjectedNode>, CatalogServiceError>;

    async fn delete_with_children(
        &self,
        node_id: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError>;

    async fn move_to_front(
        &self,
        book_id: &str,
        node_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError>;

    async fn move_after(
        &self,
        book_id: &str,
        node_id: &str,
        after_id: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError>;

    async fn update_title(
        &self,
        node_id: &str,
        title: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError>;
}

#[async_trait]
impl CatalogBackend for CatalogService {
    async fn catalog(&self, book_id: &str) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        CatalogService::catalog(self, book_id).await
    }

    async fn delete_with_children(
        &self,
        node_id: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        CatalogService::delete_with_children(self, node_id).await
    }

    async fn move_to_front(
        &self,
        book_id: &str,
        node_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        CatalogService::move_to_front(self, book_id, node_id, new_parent_id).await
    }

    async fn move_after(
        &self,
        book_id: &str,
        node_id: &str,
        after_id: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        CatalogService::move_after(self, book_id, node_id, after_id).await
    }

    async fn update_title(
        &self,
        node_id: &str,
        title: &str,
    ) -> Result<Vec<ProjectedNode>, CatalogServiceError> {
        CatalogService::update_title(self, node_id, title).await
    }
}
