//! Domain Ports - Core trait definitions for the mesh topology core
//!
//! These traits define the boundaries between the allocation/reconciliation
//! logic and external systems (the record store, the UISP inventory, the
//! change notification sink). Adapters implement these traits to provide
//! concrete functionality.

use crate::error::Result;
use crate::model::{BuildingId, Device, DeviceId, Install, Link, Los, Node, NodeId};
use crate::notify::ChangeEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Inventory Snapshot Types
// =============================================================================

/// A device as reported by the network-management system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDevice {
    /// External identity (UISP id)
    pub id: String,
    pub name: String,
    /// Hardware category, e.g. `wireless`, `optical`
    #[serde(default)]
    pub category: Option<String>,
    /// Product family, e.g. `airMax`, `airFiber`
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Radio mode, e.g. `ap-ptmp`, `sta-ptp`
    #[serde(default)]
    pub wireless_mode: Option<String>,
    /// Reported status, e.g. `active`, `disconnected`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InventoryDevice {
    /// Whether the inventory considers the device up right now
    pub fn is_online(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(false)
    }
}

/// Identification block of a link endpoint device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointIdentification {
    pub id: String,
}

/// Device reference on a link endpoint. UISP nests the id under
/// `identification`; flattened dumps put it directly on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<EndpointIdentification>,
}

/// One side of a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub device: EndpointDevice,
}

impl LinkEndpoint {
    /// Endpoint referencing the device with the given external id
    pub fn for_device(id: impl Into<String>) -> Self {
        Self {
            device: EndpointDevice {
                id: Some(id.into()),
                identification: None,
            },
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device
            .id
            .as_deref()
            .or_else(|| self.device.identification.as_ref().map(|i| i.id.as_str()))
    }
}

/// A link as reported by the network-management system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLink {
    pub id: String,
    /// Technology, e.g. `wireless`, `ethernet`, `pon`
    #[serde(rename = "type")]
    pub kind: String,
    /// Operating frequency in MHz, wireless links only
    #[serde(default)]
    pub frequency: Option<u32>,
    #[serde(default)]
    pub state: Option<String>,
    pub from: LinkEndpoint,
    pub to: LinkEndpoint,
}

impl InventoryLink {
    pub fn is_active(&self) -> bool {
        self.state
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(false)
    }

    pub fn from_device_id(&self) -> Option<&str> {
        self.from.device_id()
    }

    pub fn to_device_id(&self) -> Option<&str> {
        self.to.device_id()
    }
}

/// Per-device details fetched on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

// =============================================================================
// Inventory Source Port
// =============================================================================

/// Port for the network-management system holding the live inventory
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch every device in the inventory
    async fn get_devices(&self) -> Result<Vec<InventoryDevice>>;

    /// Fetch every link in the inventory
    async fn get_links(&self) -> Result<Vec<InventoryLink>>;

    /// Fetch details for a single device
    async fn get_device_detail(&self, id: &str) -> Result<DeviceDetail>;

    /// Get source name
    fn source_name(&self) -> &str;
}

// =============================================================================
// Change Notifier Port
// =============================================================================

/// Port for delivering change summaries to administrators. Implementations
/// may fail; the dispatcher owns retries and never lets a failure escape.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, event: &ChangeEvent) -> Result<()>;

    /// Get sink name
    fn sink_name(&self) -> &str;
}

// =============================================================================
// Repository Ports
// =============================================================================

/// Node lookups shared by the allocator and the reconciler
#[async_trait]
pub trait NodeLookup: Send + Sync {
    async fn find_node_by_number(&self, network_number: u32) -> Result<Option<Node>>;

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>>;
}

/// Records the allocator reads and writes in the shared number namespace
#[async_trait]
pub trait NumberRegistry: NodeLookup {
    /// Persist a node. Saving a node with a network number settles any
    /// pending claim on that number.
    async fn save_node(&self, node: &Node) -> Result<()>;

    /// Network numbers of every node that has one
    async fn node_numbers(&self) -> Result<Vec<u32>>;

    async fn find_install_by_number(&self, install_number: u32) -> Result<Option<Install>>;

    async fn save_install(&self, install: &Install) -> Result<()>;

    /// Install numbers that hold their number on their own (see
    /// [`Install::holds_number`])
    async fn held_install_numbers(&self) -> Result<Vec<u32>>;

    /// Numbers handed out but not yet carried by a node
    async fn pending_claims(&self) -> Result<Vec<u32>>;

    async fn record_claim(&self, number: u32) -> Result<()>;

    async fn release_claim(&self, number: u32) -> Result<()>;
}

/// Records the reconciler and topology sync read and write
#[async_trait]
pub trait TopologyRepository: NodeLookup {
    async fn find_device_by_uisp_id(&self, uisp_id: &str) -> Result<Option<Device>>;

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>>;

    async fn save_device(&self, device: &Device) -> Result<()>;

    async fn find_link_by_uisp_id(&self, uisp_id: &str) -> Result<Option<Link>>;

    /// Links joining the two devices, in either direction
    async fn find_links_between(&self, a: DeviceId, b: DeviceId) -> Result<Vec<Link>>;

    async fn list_links(&self) -> Result<Vec<Link>>;

    async fn save_link(&self, link: &Link) -> Result<()>;

    /// LOS rows joining the two buildings, in either direction
    async fn find_los_between(&self, a: BuildingId, b: BuildingId) -> Result<Vec<Los>>;

    async fn save_los(&self, los: &Los) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type InventorySourceRef = Arc<dyn InventorySource>;
pub type ChangeNotifierRef = Arc<dyn ChangeNotifier>;
pub type NumberRegistryRef = Arc<dyn NumberRegistry>;
pub type TopologyRepositoryRef = Arc<dyn TopologyRepository>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_device_online() {
        let json = r#"{"id":"d1","name":"nycmesh-227-east","status":"Active","wirelessMode":"ap-ptmp"}"#;
        let device: InventoryDevice = serde_json::from_str(json).unwrap();
        assert!(device.is_online());
        assert_eq!(device.wireless_mode.as_deref(), Some("ap-ptmp"));

        let json = r#"{"id":"d2","name":"nycmesh-227-west","status":"disconnected"}"#;
        let device: InventoryDevice = serde_json::from_str(json).unwrap();
        assert!(!device.is_online());
    }

    #[test]
    fn test_link_endpoint_accepts_both_shapes() {
        let json = r#"{
            "id": "l1",
            "type": "wireless",
            "frequency": 5180,
            "state": "active",
            "from": {"device": {"id": "a"}},
            "to": {"device": {"identification": {"id": "b"}}}
        }"#;
        let link: InventoryLink = serde_json::from_str(json).unwrap();
        assert_eq!(link.from_device_id(), Some("a"));
        assert_eq!(link.to_device_id(), Some("b"));
        assert!(link.is_active());
    }
}
