//! Inventory Module
//!
//! [`InventorySource`](crate::domain::ports::InventorySource) adapters: the
//! live UISP API and recorded snapshot files.

pub mod snapshot;
pub mod uisp;

pub use snapshot::*;
pub use uisp::*;
