//! Business Services
//!
//! - `CatalogService` - book/node creation, catalog projection and the
//!   transactional tree mutation protocol
//!
//! Services coordinate between the database layer and callers, enforcing
//! the catalog invariants on every write.

pub mod catalog_service;
pub mod error;

pub use catalog_service::CatalogService;
pub use error::CatalogServiceError;
