//! Error types for the mesh topology core
//!
//! Provides structured error types for the network-number allocator, the
//! inventory reconciler, notification delivery and the ambient plumbing
//! (configuration, parsing, IO).

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("Number {number} is outside the range [{min}, {max}]")]
    NumberOutOfRange { number: u32, min: u32, max: u32 },

    #[error("Number {number} is already in use by {owner}")]
    NumberCollision { number: u32, owner: String },

    #[error("Number {number} belongs to active install {install_id} and cannot be reassigned")]
    ActiveInstallConflict { number: u32, install_id: String },

    #[error("No free number left in the range [{min}, {max}]")]
    NumberSpaceExhausted { min: u32, max: u32 },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("Cannot resolve a node for device {}{}", .device, nn_suffix(.network_number))]
    UnresolvedNode {
        device: String,
        network_number: Option<u32>,
    },

    #[error("Link {link} references unknown device {device_uisp_id}")]
    UnresolvedLinkEndpoint { link: String, device_uisp_id: String },

    #[error("Link {link} cannot be classified: type '{kind}', frequency {frequency:?}")]
    UnclassifiableLink {
        link: String,
        kind: String,
        frequency: Option<u32>,
    },

    #[error("Invalid line of sight: {0}")]
    InvalidLos(String),

    // =========================================================================
    // Inventory Source Errors
    // =========================================================================
    #[error("Inventory connection error: {0}")]
    InventoryConnection(#[from] reqwest::Error),

    #[error("Inventory response error: {0}")]
    InventoryResponse(String),

    // =========================================================================
    // Notification Errors
    // =========================================================================
    #[error("Notification delivery failed: {0}")]
    NotificationDelivery(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn nn_suffix(network_number: &Option<u32>) -> String {
    network_number
        .map(|nn| format!(" (network number {})", nn))
        .unwrap_or_default()
}

/// Action to take on error during a periodic reconcile run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::InventoryConnection(_) | Error::NotificationDelivery(_) => {
                ErrorAction::RequeueWithBackoff
            }

            // Upstream answered but with garbage - give it a while
            Error::InventoryResponse(_) => ErrorAction::RequeueAfter(Duration::from_secs(300)),

            // Allocation outcomes are decisions, not faults
            Error::NumberOutOfRange { .. }
            | Error::NumberCollision { .. }
            | Error::ActiveInstallConflict { .. }
            | Error::NumberSpaceExhausted { .. } => ErrorAction::NoRequeue,

            // Configuration errors - don't retry automatically
            Error::Configuration(_) | Error::YamlParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::InventoryConnection(_) | Error::NotificationDelivery(_)
        )
    }

    /// Errors scoped to a single inventory record. The reconciler turns these
    /// into diagnostics and carries on with the batch.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedNode { .. }
                | Error::UnresolvedLinkEndpoint { .. }
                | Error::UnclassifiableLink { .. }
                | Error::InvalidLos(_)
        )
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
