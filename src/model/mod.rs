//! Topology Model
//!
//! Records the core reads and writes: nodes and installs sharing the
//! network-number namespace, devices and links mirrored from UISP, and
//! line-of-sight rows derived from links.

pub mod device;
pub mod ids;
pub mod link;
pub mod los;
pub mod node;

pub use device::*;
pub use ids::*;
pub use link::*;
pub use los::*;
pub use node::*;
