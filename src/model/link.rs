//! Links between devices

use super::ids::{DeviceId, LinkId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Link lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Inactive,
    Planned,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Active => write!(f, "Active"),
            LinkStatus::Inactive => write!(f, "Inactive"),
            LinkStatus::Planned => write!(f, "Planned"),
        }
    }
}

/// Link technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    FiveGhz,
    TwentyFourGhz,
    SixtyGhz,
    SeventyEightyGhz,
    Ethernet,
    Fiber,
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkType::FiveGhz => write!(f, "5 GHz"),
            LinkType::TwentyFourGhz => write!(f, "24 GHz"),
            LinkType::SixtyGhz => write!(f, "60 GHz"),
            LinkType::SeventyEightyGhz => write!(f, "70-80 GHz"),
            LinkType::Ethernet => write!(f, "Ethernet"),
            LinkType::Fiber => write!(f, "Fiber"),
        }
    }
}

/// Connection between two devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    #[serde(default)]
    pub uisp_id: Option<String>,
    pub from_device: DeviceId,
    pub to_device: DeviceId,
    pub status: LinkStatus,
    #[serde(rename = "type", default)]
    pub link_type: Option<LinkType>,
    #[serde(default)]
    pub install_date: Option<NaiveDate>,
    #[serde(default)]
    pub abandon_date: Option<NaiveDate>,
}

impl Link {
    pub fn new(from_device: DeviceId, to_device: DeviceId, status: LinkStatus) -> Self {
        Self {
            id: LinkId::new(),
            uisp_id: None,
            from_device,
            to_device,
            status,
            link_type: None,
            install_date: None,
            abandon_date: None,
        }
    }

    pub fn with_uisp_id(mut self, uisp_id: impl Into<String>) -> Self {
        self.uisp_id = Some(uisp_id.into());
        self
    }

    /// Whether this link joins `a` and `b`, in either direction
    pub fn connects(&self, a: DeviceId, b: DeviceId) -> bool {
        (self.from_device == a && self.to_device == b)
            || (self.from_device == b && self.to_device == a)
    }
}
