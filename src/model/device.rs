//! Devices and Sectors
//!
//! A device is a piece of radio or switching hardware mounted at a node.
//! Sectors are devices that broadcast to many clients and carry a beam
//! geometry on top of the common fields.

use super::ids::{DeviceId, NodeId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default compass heading for a sector, in degrees
pub const DEFAULT_SECTOR_AZIMUTH: u16 = 0;

/// Default beam width for a sector, in degrees
pub const DEFAULT_SECTOR_WIDTH: u16 = 0;

/// Default coverage radius for a sector, in kilometres
pub const DEFAULT_SECTOR_RADIUS_KM: f64 = 1.0;

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Potential,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Active => write!(f, "Active"),
            DeviceStatus::Inactive => write!(f, "Inactive"),
            DeviceStatus::Potential => write!(f, "Potential"),
        }
    }
}

/// Beam geometry of a sector antenna
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorGeometry {
    /// Compass heading of the beam centre
    pub azimuth_deg: u16,
    /// Horizontal beam width
    pub width_deg: u16,
    pub radius_km: f64,
}

impl Default for SectorGeometry {
    fn default() -> Self {
        Self {
            azimuth_deg: DEFAULT_SECTOR_AZIMUTH,
            width_deg: DEFAULT_SECTOR_WIDTH,
            radius_km: DEFAULT_SECTOR_RADIUS_KM,
        }
    }
}

/// Hardware mounted at a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// UISP identity; the only key snapshot rows are matched on
    #[serde(default)]
    pub uisp_id: Option<String>,
    pub name: String,
    pub node: NodeId,
    pub status: DeviceStatus,
    #[serde(default)]
    pub install_date: Option<NaiveDate>,
    #[serde(default)]
    pub abandon_date: Option<NaiveDate>,
    /// Present when the device is a sector
    #[serde(default)]
    pub sector: Option<SectorGeometry>,
}

impl Device {
    pub fn new(name: impl Into<String>, node: NodeId, status: DeviceStatus) -> Self {
        Self {
            id: DeviceId::new(),
            uisp_id: None,
            name: name.into(),
            node,
            status,
            install_date: None,
            abandon_date: None,
            sector: None,
        }
    }

    pub fn with_uisp_id(mut self, uisp_id: impl Into<String>) -> Self {
        self.uisp_id = Some(uisp_id.into());
        self
    }

    pub fn is_sector(&self) -> bool {
        self.sector.is_some()
    }
}
