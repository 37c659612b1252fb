//! Nodes and Installs
//!
//! Both draw their numbers from the same namespace: a Node's network number
//! and an Install's install number can collide, and the allocator arbitrates.

use super::ids::{BuildingId, InstallId, NodeId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Node
// =============================================================================

/// Operational status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Planned,
}

/// Role of a node in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Standard,
    Hub,
    Supernode,
    Pop,
    Ap,
    Remote,
}

/// Logical mesh router addressed by a network number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Network number, unset while the node is still being planned
    pub network_number: Option<u32>,
    pub name: Option<String>,
    pub status: NodeStatus,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Buildings served by this node; the first one is representative
    #[serde(default)]
    pub buildings: Vec<BuildingId>,
}

impl Node {
    pub fn new(network_number: Option<u32>, status: NodeStatus) -> Self {
        Self {
            id: NodeId::new(),
            network_number,
            name: None,
            status,
            node_type: NodeType::default(),
            buildings: Vec::new(),
        }
    }

    pub fn with_building(mut self, building: BuildingId) -> Self {
        self.buildings.push(building);
        self
    }

    pub fn representative_building(&self) -> Option<BuildingId> {
        self.buildings.first().copied()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.network_number, &self.name) {
            (Some(nn), Some(name)) => write!(f, "NN{} ({})", nn, name),
            (Some(nn), None) => write!(f, "NN{}", nn),
            (None, Some(name)) => write!(f, "{}", name),
            (None, None) => write!(f, "node {}", self.id),
        }
    }
}

// =============================================================================
// Install
// =============================================================================

/// Lifecycle of an install request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    RequestReceived,
    Pending,
    Blocked,
    Active,
    Inactive,
    Closed,
    /// Terminal: the install number was donated to a node
    NnReassigned,
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallStatus::RequestReceived => write!(f, "Request Received"),
            InstallStatus::Pending => write!(f, "Pending"),
            InstallStatus::Blocked => write!(f, "Blocked"),
            InstallStatus::Active => write!(f, "Active"),
            InstallStatus::Inactive => write!(f, "Inactive"),
            InstallStatus::Closed => write!(f, "Closed"),
            InstallStatus::NnReassigned => write!(f, "NN Reassigned"),
        }
    }
}

/// A physical install request or installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Install {
    pub id: InstallId,
    pub install_number: u32,
    pub status: InstallStatus,
    /// Node this install connects to, if any
    #[serde(default)]
    pub node: Option<NodeId>,
}

impl Install {
    pub fn new(install_number: u32, status: InstallStatus) -> Self {
        Self {
            id: InstallId::new(),
            install_number,
            status,
            node: None,
        }
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Whether this install's number counts as taken when looking for a
    /// free number. Requests that were never processed and installs that
    /// already hang off a node do not hold the number on their own.
    pub fn holds_number(&self) -> bool {
        self.status != InstallStatus::RequestReceived && self.node.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_holds_number() {
        assert!(!Install::new(200, InstallStatus::RequestReceived).holds_number());
        assert!(Install::new(200, InstallStatus::Pending).holds_number());
        assert!(!Install::new(200, InstallStatus::Active)
            .with_node(NodeId::new())
            .holds_number());
    }

    #[test]
    fn test_node_display() {
        let mut node = Node::new(Some(227), NodeStatus::Active);
        assert_eq!(node.to_string(), "NN227");
        node.name = Some("Supernode 1".into());
        assert_eq!(node.to_string(), "NN227 (Supernode 1)");
    }

    #[test]
    fn test_install_status_serde() {
        let json = serde_json::to_string(&InstallStatus::NnReassigned).unwrap();
        assert_eq!(json, "\"nn_reassigned\"");
    }
}
