//! MeshDB Core - Network Numbers and Inventory Reconciliation
//!
//! The parts of the mesh topology database with real concurrency and
//! consistency risk: handing out unique numbers from the namespace shared by
//! installs and nodes, and mirroring the live UISP inventory into the
//! internal device/link/LOS model.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              meshdb-sync                                     │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────┐      ┌──────────────────────────────────┐  │
//! │  │      Number Allocator       │      │           Reconciler             │  │
//! │  │  advisory lock → row lock   │      │  devices → links → LOS sync      │  │
//! │  └──────────────┬──────────────┘      └───────┬──────────────────┬───────┘  │
//! │                 │                             │                  │          │
//! │      ┌──────────┴─────────────────────────────┴───┐   ┌──────────┴───────┐  │
//! │      │    Repository ports (MemoryStore)          │   │ InventorySource  │  │
//! │      │    nodes · installs · devices · links · LOS│   │ UISP · snapshot  │  │
//! │      └────────────────────────────────────────────┘   └──────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                  Notification Dispatcher (fire-and-forget)                   │
//! │               bounded retries with backoff → log / webhook sink              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`allocation`]: Number space, locks and the network-number allocator
//! - [`reconcile`]: UISP device/link reconciliation and LOS sync
//! - [`inventory`]: UISP API client and snapshot file source
//! - [`notify`]: Change events, sinks and the dispatcher
//! - [`store`]: In-memory repository with JSON import/export
//! - [`model`]: Topology records
//! - [`domain`]: Port traits and inventory snapshot types
//! - [`config`]: YAML configuration
//! - [`error`]: Error types and handling

pub mod allocation;
pub mod config;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod store;

// Re-export commonly used types
pub use allocation::{
    AllocationHook, CandidateOutcome, LockManager, NumberAllocator, NumberSpace,
    NumberSpaceConfig,
};

pub use config::MeshConfig;

pub use domain::ports::{
    ChangeNotifier, InventoryDevice, InventoryLink, InventorySource, NodeLookup, NumberRegistry,
    TopologyRepository,
};

pub use error::{Error, ErrorAction, Result};

pub use inventory::{SnapshotInventory, UispConfig, UispInventory};

pub use notify::{ChangeEvent, NotificationDispatcher, NotifierConfig};

pub use reconcile::{ReconcileReport, ReconcileScope, Reconciler, ReconcilerConfig};

pub use store::{MemoryStore, TopologyDocument};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
