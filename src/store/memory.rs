//! In-Memory Record Store
//!
//! Holds nodes, installs, devices, links and LOS rows behind a single
//! `parking_lot` lock and implements both repository ports. Uniqueness of
//! network numbers, install numbers and UISP ids is enforced on save.

use crate::domain::ports::{NodeLookup, NumberRegistry, TopologyRepository};
use crate::error::{Error, Result};
use crate::model::{
    BuildingId, Device, DeviceId, Install, InstallId, Link, LinkId, Los, LosId, Node, NodeId,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Topology Document
// =============================================================================

/// Serialized form of a whole topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyDocument {
    pub nodes: Vec<Node>,
    pub installs: Vec<Install>,
    pub devices: Vec<Device>,
    pub links: Vec<Link>,
    pub los: Vec<Los>,
}

// =============================================================================
// Store State
// =============================================================================

#[derive(Debug, Default)]
struct StoreState {
    nodes: HashMap<NodeId, Node>,
    installs: HashMap<InstallId, Install>,
    devices: HashMap<DeviceId, Device>,
    links: HashMap<LinkId, Link>,
    los: HashMap<LosId, Los>,
    /// Numbers handed out by the allocator that no node carries yet
    claims: BTreeSet<u32>,
}

impl StoreState {
    fn put_node(&mut self, node: Node) -> Result<()> {
        if let Some(nn) = node.network_number {
            if let Some(other) = self
                .nodes
                .values()
                .find(|n| n.id != node.id && n.network_number == Some(nn))
            {
                return Err(Error::NumberCollision {
                    number: nn,
                    owner: format!("node {}", other.id),
                });
            }
            self.claims.remove(&nn);
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    fn put_install(&mut self, install: Install) -> Result<()> {
        if let Some(other) = self
            .installs
            .values()
            .find(|i| i.id != install.id && i.install_number == install.install_number)
        {
            return Err(Error::NumberCollision {
                number: install.install_number,
                owner: format!("install {}", other.id),
            });
        }
        self.installs.insert(install.id, install);
        Ok(())
    }

    fn put_device(&mut self, device: Device) -> Result<()> {
        if !self.nodes.contains_key(&device.node) {
            return Err(Error::NodeNotFound {
                node_id: device.node.to_string(),
            });
        }
        if let Some(uisp_id) = &device.uisp_id {
            if self
                .devices
                .values()
                .any(|d| d.id != device.id && d.uisp_id.as_ref() == Some(uisp_id))
            {
                return Err(Error::Internal(format!(
                    "UISP id {} already belongs to another device",
                    uisp_id
                )));
            }
        }
        self.devices.insert(device.id, device);
        Ok(())
    }

    fn put_link(&mut self, link: Link) -> Result<()> {
        for endpoint in [link.from_device, link.to_device] {
            if !self.devices.contains_key(&endpoint) {
                return Err(Error::Internal(format!(
                    "link {} references unknown device {}",
                    link.id, endpoint
                )));
            }
        }
        if let Some(uisp_id) = &link.uisp_id {
            if self
                .links
                .values()
                .any(|l| l.id != link.id && l.uisp_id.as_ref() == Some(uisp_id))
            {
                return Err(Error::Internal(format!(
                    "UISP id {} already belongs to another link",
                    uisp_id
                )));
            }
        }
        self.links.insert(link.id, link);
        Ok(())
    }

    fn put_los(&mut self, los: Los) -> Result<()> {
        if los.from_building == los.to_building {
            return Err(Error::InvalidLos(format!(
                "building {} cannot have line of sight to itself",
                los.from_building
            )));
        }
        self.los.insert(los.id, los);
        Ok(())
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// Repository backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build a store from a topology document
    pub fn from_document(document: TopologyDocument) -> Result<Arc<Self>> {
        let store = Self::default();
        {
            let mut state = store.state.write();
            for node in document.nodes {
                state.put_node(node)?;
            }
            for install in document.installs {
                state.put_install(install)?;
            }
            for device in document.devices {
                state.put_device(device)?;
            }
            for link in document.links {
                state.put_link(link)?;
            }
            for los in document.los {
                state.put_los(los)?;
            }
        }
        Ok(Arc::new(store))
    }

    /// Load a topology document from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let document: TopologyDocument = serde_json::from_str(&raw)?;
        info!(
            "Loaded topology from {}: {} nodes, {} installs, {} devices, {} links, {} LOS",
            path.display(),
            document.nodes.len(),
            document.installs.len(),
            document.devices.len(),
            document.links.len(),
            document.los.len()
        );
        Self::from_document(document)
    }

    /// Snapshot the whole topology in a stable order
    pub fn export(&self) -> TopologyDocument {
        let state = self.state.read();

        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| (n.network_number.is_none(), n.network_number, n.id));
        let mut installs: Vec<Install> = state.installs.values().cloned().collect();
        installs.sort_by_key(|i| i.install_number);
        let mut devices: Vec<Device> = state.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let mut links: Vec<Link> = state.links.values().cloned().collect();
        links.sort_by_key(|l| l.id);
        let mut los: Vec<Los> = state.los.values().cloned().collect();
        los.sort_by_key(|l| l.id);

        TopologyDocument {
            nodes,
            installs,
            devices,
            links,
            los,
        }
    }

    /// Write the topology to a JSON file
    pub fn export_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path, json)?;
        debug!("Exported topology to {}", path.display());
        Ok(())
    }

    pub fn put_node(&self, node: Node) -> Result<()> {
        self.state.write().put_node(node)
    }

    pub fn put_install(&self, install: Install) -> Result<()> {
        self.state.write().put_install(install)
    }

    pub fn put_device(&self, device: Device) -> Result<()> {
        self.state.write().put_device(device)
    }

    pub fn put_link(&self, link: Link) -> Result<()> {
        self.state.write().put_link(link)
    }

    pub fn put_los(&self, los: Los) -> Result<()> {
        self.state.write().put_los(los)
    }

    pub fn install(&self, id: InstallId) -> Option<Install> {
        self.state.read().installs.get(&id).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.export().devices
    }

    pub fn links(&self) -> Vec<Link> {
        self.export().links
    }

    pub fn los_rows(&self) -> Vec<Los> {
        self.export().los
    }
}

// =============================================================================
// Repository Implementations
// =============================================================================

#[async_trait]
impl NodeLookup for MemoryStore {
    async fn find_node_by_number(&self, network_number: u32) -> Result<Option<Node>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .find(|n| n.network_number == Some(network_number))
            .cloned())
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.state.read().nodes.get(&id).cloned())
    }
}

#[async_trait]
impl NumberRegistry for MemoryStore {
    async fn save_node(&self, node: &Node) -> Result<()> {
        self.state.write().put_node(node.clone())
    }

    async fn node_numbers(&self) -> Result<Vec<u32>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .filter_map(|n| n.network_number)
            .collect())
    }

    async fn find_install_by_number(&self, install_number: u32) -> Result<Option<Install>> {
        Ok(self
            .state
            .read()
            .installs
            .values()
            .find(|i| i.install_number == install_number)
            .cloned())
    }

    async fn save_install(&self, install: &Install) -> Result<()> {
        self.state.write().put_install(install.clone())
    }

    async fn held_install_numbers(&self) -> Result<Vec<u32>> {
        Ok(self
            .state
            .read()
            .installs
            .values()
            .filter(|i| i.holds_number())
            .map(|i| i.install_number)
            .collect())
    }

    async fn pending_claims(&self) -> Result<Vec<u32>> {
        Ok(self.state.read().claims.iter().copied().collect())
    }

    async fn record_claim(&self, number: u32) -> Result<()> {
        if !self.state.write().claims.insert(number) {
            return Err(Error::NumberCollision {
                number,
                owner: "a pending claim".to_string(),
            });
        }
        Ok(())
    }

    async fn release_claim(&self, number: u32) -> Result<()> {
        self.state.write().claims.remove(&number);
        Ok(())
    }
}

#[async_trait]
impl TopologyRepository for MemoryStore {
    async fn find_device_by_uisp_id(&self, uisp_id: &str) -> Result<Option<Device>> {
        Ok(self
            .state
            .read()
            .devices
            .values()
            .find(|d| d.uisp_id.as_deref() == Some(uisp_id))
            .cloned())
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.state.read().devices.get(&id).cloned())
    }

    async fn save_device(&self, device: &Device) -> Result<()> {
        self.state.write().put_device(device.clone())
    }

    async fn find_link_by_uisp_id(&self, uisp_id: &str) -> Result<Option<Link>> {
        Ok(self
            .state
            .read()
            .links
            .values()
            .find(|l| l.uisp_id.as_deref() == Some(uisp_id))
            .cloned())
    }

    async fn find_links_between(&self, a: DeviceId, b: DeviceId) -> Result<Vec<Link>> {
        Ok(self
            .state
            .read()
            .links
            .values()
            .filter(|l| l.connects(a, b))
            .cloned()
            .collect())
    }

    async fn list_links(&self) -> Result<Vec<Link>> {
        Ok(self.state.read().links.values().cloned().collect())
    }

    async fn save_link(&self, link: &Link) -> Result<()> {
        self.state.write().put_link(link.clone())
    }

    async fn find_los_between(&self, a: BuildingId, b: BuildingId) -> Result<Vec<Los>> {
        Ok(self
            .state
            .read()
            .los
            .values()
            .filter(|l| l.joins(a, b))
            .cloned()
            .collect())
    }

    async fn save_los(&self, los: &Los) -> Result<()> {
        self.state.write().put_los(los.clone())
    }
}
