//! Snapshot File Inventory
//!
//! Serves a recorded UISP snapshot (`{devices, links, details}`) instead of
//! the live API, for offline replays and tests.

use crate::domain::ports::{DeviceDetail, InventoryDevice, InventoryLink, InventorySource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Recorded inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotDocument {
    pub devices: Vec<InventoryDevice>,
    pub links: Vec<InventoryLink>,
    /// Per-device details keyed by UISP id
    pub details: HashMap<String, DeviceDetail>,
}

/// [`InventorySource`] serving a [`SnapshotDocument`]
#[derive(Debug, Default)]
pub struct SnapshotInventory {
    document: RwLock<SnapshotDocument>,
    failure: RwLock<Option<String>>,
    detail_requests: AtomicU64,
}

impl SnapshotInventory {
    pub fn new(document: SnapshotDocument) -> Self {
        Self {
            document: RwLock::new(document),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let document: SnapshotDocument = serde_json::from_str(&raw)?;
        info!(
            "Loaded inventory snapshot from {}: {} devices, {} links",
            path.display(),
            document.devices.len(),
            document.links.len()
        );
        Ok(Self::new(document))
    }

    /// Swap in a new snapshot
    pub fn replace(&self, document: SnapshotDocument) {
        *self.document.write() = document;
    }

    /// Make every fetch fail until [`recover`](Self::recover) is called
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    /// Number of device detail lookups served so far
    pub fn detail_requests(&self) -> u64 {
        self.detail_requests.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        match self.failure.read().as_ref() {
            Some(message) => Err(Error::InventoryResponse(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InventorySource for SnapshotInventory {
    async fn get_devices(&self) -> Result<Vec<InventoryDevice>> {
        self.check_available()?;
        Ok(self.document.read().devices.clone())
    }

    async fn get_links(&self) -> Result<Vec<InventoryLink>> {
        self.check_available()?;
        Ok(self.document.read().links.clone())
    }

    /// Recorded details win; otherwise the device row's own last-seen
    async fn get_device_detail(&self, id: &str) -> Result<DeviceDetail> {
        self.check_available()?;
        self.detail_requests.fetch_add(1, Ordering::Relaxed);

        let document = self.document.read();
        if let Some(detail) = document.details.get(id) {
            return Ok(detail.clone());
        }
        document
            .devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| DeviceDetail {
                last_seen: d.last_seen,
            })
            .ok_or_else(|| Error::InventoryResponse(format!("Unknown UISP device {}", id)))
    }

    fn source_name(&self) -> &str {
        "snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tokio_test::assert_ok;

    const SNAPSHOT: &str = r#"{
        "devices": [
            {"id": "d1", "name": "nycmesh-227-east", "status": "active", "lastSeen": "2024-05-30T10:00:00Z"}
        ],
        "links": [
            {"id": "l1", "type": "ethernet", "from": {"device": {"id": "d1"}}, "to": {"device": {"id": "d2"}}}
        ],
        "details": {
            "d2": {"lastSeen": "2024-04-01T00:00:00Z"}
        }
    }"#;

    #[tokio::test]
    async fn test_load_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let inventory = SnapshotInventory::from_json_file(file.path()).unwrap();
        assert_eq!(assert_ok!(inventory.get_devices().await).len(), 1);
        assert_eq!(assert_ok!(inventory.get_links().await).len(), 1);

        // Falls back to the device row
        let detail = assert_ok!(inventory.get_device_detail("d1").await);
        assert!(detail.last_seen.is_some());
        let detail = assert_ok!(inventory.get_device_detail("d2").await);
        assert!(detail.last_seen.is_some());
        assert_eq!(inventory.detail_requests(), 2);

        assert_matches!(
            inventory.get_device_detail("nope").await,
            Err(Error::InventoryResponse(_))
        );
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let inventory = SnapshotInventory::new(SnapshotDocument::default());
        inventory.fail_with("connection refused");
        assert_matches!(inventory.get_devices().await, Err(Error::InventoryResponse(_)));

        inventory.recover();
        assert_ok!(inventory.get_links().await);
    }
}
