//! UISP Inventory Client
//!
//! Reads devices, data links and per-device details from the UISP NMS API.

use crate::domain::ports::{DeviceDetail, InventoryDevice, InventoryLink, InventorySource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const API_PREFIX: &str = "/nms/api/v2.1";

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for UISP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UispConfig {
    /// Base URL, e.g. `https://uisp.mesh.nycmesh.net`
    pub base_url: Option<String>,
    /// API token sent as `x-auth-token`
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UispConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: 30,
        }
    }
}

impl UispConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UispIdentification {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "type", default)]
    device_type: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UispOverview {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    wireless_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UispDevice {
    identification: UispIdentification,
    #[serde(default)]
    overview: Option<UispOverview>,
}

impl From<UispDevice> for InventoryDevice {
    fn from(device: UispDevice) -> Self {
        let overview = device.overview.unwrap_or_default();
        let identification = device.identification;
        Self {
            name: identification
                .name
                .unwrap_or_else(|| identification.id.clone()),
            id: identification.id,
            category: identification.category,
            device_type: identification.device_type,
            model: identification.model,
            wireless_mode: overview.wireless_mode,
            status: overview.status,
            last_seen: overview.last_seen,
            created_at: overview.created_at,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// [`InventorySource`] backed by the UISP HTTP API
#[derive(Debug)]
pub struct UispInventory {
    client: reqwest::Client,
    base_url: String,
}

impl UispInventory {
    pub fn new(config: &UispConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Configuration("UISP base URL is not set".into()))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| Error::Configuration(format!("Invalid UISP token: {}", e)))?;
            headers.insert("x-auth-token", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid UISP client: {}", e)))?;

        info!("Using UISP inventory at {}", base_url);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InventoryResponse(format!(
                "GET {} returned {}: {}",
                path, status, body
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::InventoryResponse(format!("GET {}: invalid body: {}", path, e)))
    }
}

#[async_trait]
impl InventorySource for UispInventory {
    async fn get_devices(&self) -> Result<Vec<InventoryDevice>> {
        let devices: Vec<UispDevice> = self.get("/devices").await?;
        Ok(devices.into_iter().map(InventoryDevice::from).collect())
    }

    async fn get_links(&self) -> Result<Vec<InventoryLink>> {
        self.get("/data-links").await
    }

    async fn get_device_detail(&self, id: &str) -> Result<DeviceDetail> {
        let path = format!("/devices/{}", urlencoding::encode(id));
        let device: UispDevice = self.get(&path).await?;
        Ok(DeviceDetail {
            last_seen: device.overview.and_then(|o| o.last_seen),
        })
    }

    fn source_name(&self) -> &str {
        "uisp"
    }
}
