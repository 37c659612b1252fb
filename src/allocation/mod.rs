//! Allocation Module
//!
//! Hands out numbers from the namespace shared by install numbers and node
//! network numbers, and validates numbers operators pick by hand.

pub mod allocator;
pub mod locks;
pub mod number_space;

pub use allocator::*;
pub use locks::*;
pub use number_space::*;
