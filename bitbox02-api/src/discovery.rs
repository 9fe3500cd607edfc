//! Locating a BitBox02 through the BitBoxBridge service or direct HID

use crate::error::{Error, Result};
use crate::types::{BridgeConfig, DevicePath};
use log::{debug, info, warn};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BridgeDevice {
    path: String,
}

#[derive(Debug, Deserialize)]
struct BridgeDevices {
    #[serde(default)]
    devices: Vec<BridgeDevice>,
}

/// Ask the bridge for its devices until exactly one BitBox02 is listed and
/// return its bridge path.
pub async fn discover_bridge_device(config: &BridgeConfig) -> Result<String> {
    let client = reqwest::Client::new();
    let url = format!(
        "{}/api/v1/devices",
        config.discovery_url.trim_end_matches('/')
    );

    for attempt in 1..=config.attempts {
        debug!("Querying BitBoxBridge at {url} (attempt {attempt})");
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("BitBoxBridge request failed: {e}");
                return Err(Error::ConnectionError("BitBoxBridge not found".to_string()));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::ConnectionError("Origin not whitelisted".to_string()));
        }
        if !status.is_success() {
            warn!("BitBoxBridge returned status {status}");
            return Err(Error::ConnectionError("Unexpected".to_string()));
        }

        let listing: BridgeDevices = response.json().await?;
        match listing.devices.as_slice() {
            [device] => {
                info!("Found BitBox02 at bridge path {}", device.path);
                return Ok(device.path.clone());
            }
            devices => {
                debug!("Bridge lists {} devices, retrying", devices.len());
                tokio::time::sleep(config.retry_interval).await;
            }
        }
    }

    Err(Error::ConnectionError("Expected one BitBox02".to_string()))
}

/// Pick a device path: the direct HID device when one is plugged in and
/// `force_bridge` is not set, otherwise the single device the bridge lists.
pub async fn get_device_path(force_bridge: bool, config: &BridgeConfig) -> Result<DevicePath> {
    #[cfg(feature = "hid")]
    if !force_bridge {
        let present = tokio::task::spawn_blocking(crate::transport::hid::is_present)
            .await
            .unwrap_or(false);
        if present {
            info!("Using direct HID connection");
            return Ok(DevicePath::Hid);
        }
    }
    #[cfg(not(feature = "hid"))]
    let _ = force_bridge;

    discover_bridge_device(config).await.map(DevicePath::Bridge)
}
