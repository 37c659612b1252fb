//! Reconciliation Module
//!
//! Mirrors the UISP inventory into the internal topology and derives
//! line-of-sight rows from the resulting links.

mod devices;
pub mod heuristics;
mod links;
pub mod reconciler;
pub mod status;
mod topology;

pub use heuristics::*;
pub use reconciler::*;
pub use status::*;
