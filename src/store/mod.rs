//! Record Store
//!
//! In-memory implementation of the repository ports, with JSON import and
//! export of the whole topology.

pub mod memory;

pub use memory::*;
