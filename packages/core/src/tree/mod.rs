//! Catalog tree structure
//!
//! - [`graph`] - id → node arena and the sibling-link edit algebra
//! - [`projection`] - pre-order flattening with depth levels
//! - [`integrity`] - invariant checker for stored node sets

pub mod graph;
pub mod integrity;
pub mod projection;

pub use graph::{CatalogGraph, GraphChanges, GraphError, MoveOutcome};
pub use integrity::{check_invariants, IntegrityViolation};
pub use projection::{project, ProjectedNode, ProjectionError};
