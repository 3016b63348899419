//! Interactive client
//!
//! - [`OptimisticCatalog`]: local replica applying edits before the server confirms
//! - [`CatalogBackend`]: the call boundary to the mutation protocol
//! - [`drag`]: pointer gesture to structural operation

mod backend;
pub mod drag;
mod model;

pub use backend::CatalogBackend;
pub use drag::{
    level_for_displacement, reach_range, resolve_drop, DragController, DragPreview, DragState,
    DropTarget, HoverPosition, ReachLevel,
};
pub use model::{ClientError, OptimisticCatalog, PendingMutation, SettleOutcome, TreeOperation};
