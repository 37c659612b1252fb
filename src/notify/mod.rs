//! Change Notification Module
//!
//! Structured change events produced by the allocator and reconciler, the
//! sinks that deliver them, and the fire-and-forget dispatcher in between.

pub mod dispatcher;
pub mod events;
pub mod sinks;

pub use dispatcher::*;
pub use events::*;
pub use sinks::*;
