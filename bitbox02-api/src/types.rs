//! Common types and protocol constants used throughout bitbox02-api

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Device status as reported by the device engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "unpaired")]
    Unpaired,
    #[serde(rename = "pairingFailed")]
    PairingFailed,
    #[serde(rename = "uninitialized")]
    Uninitialized,
    #[serde(rename = "seeded")]
    Seeded,
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "require_firmware_upgrade")]
    RequireFirmwareUpgrade,
    #[serde(rename = "require_app_upgrade")]
    RequireAppUpgrade,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Connected => "connected",
            Status::Unpaired => "unpaired",
            Status::PairingFailed => "pairingFailed",
            Status::Uninitialized => "uninitialized",
            Status::Seeded => "seeded",
            Status::Initialized => "initialized",
            Status::RequireFirmwareUpgrade => "require_firmware_upgrade",
            Status::RequireAppUpgrade => "require_app_upgrade",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product variant of the connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    #[serde(rename = "bitbox02-multi")]
    BitBox02Multi,
    #[serde(rename = "bitbox02-btconly")]
    BitBox02BtcOnly,
    #[serde(rename = "bitboxbase-standard")]
    BitBoxBaseStandard,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Product::BitBox02Multi => "bitbox02-multi",
            Product::BitBox02BtcOnly => "bitbox02-btconly",
            Product::BitBoxBaseStandard => "bitboxbase-standard",
        };
        f.write_str(name)
    }
}

/// Ethereum network as understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EthCoin {
    Eth = 0,
    RopstenEth = 1,
    RinkebyEth = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EthPubOutputType {
    Address = 0,
    Xpub = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcCoin {
    Btc = 0,
    Tbtc = 1,
    Ltc = 2,
    Tltc = 3,
}

/// Single-sig script type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcSimpleType {
    P2wpkhP2sh = 0,
    P2wpkh = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BtcOutputType {
    #[default]
    Unknown = 0,
    P2pkh = 1,
    P2sh = 2,
    P2wpkh = 3,
    P2wsh = 4,
}

/// Serialization format for Bitcoin xpubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcXPubType {
    Tpub = 0,
    Xpub = 1,
    Ypub = 2,
    Zpub = 3,
    Vpub = 4,
    Upub = 5,
    CapitalVpub = 6,
    CapitalZpub = 7,
    CapitalUpub = 8,
    CapitalYpub = 9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardanoNetwork {
    Mainnet = 0,
    Testnet = 1,
}

/// Which kind of transport a session talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Websocket to the local BitBoxBridge service
    Bridge,
    /// Direct USB HID reports
    Hid,
}

/// Where to find the device: a BitBoxBridge device path, or the direct HID device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePath {
    Bridge(String),
    Hid,
}

impl DevicePath {
    pub fn mode(&self) -> TransportMode {
        match self {
            DevicePath::Bridge(_) => TransportMode::Bridge,
            DevicePath::Hid => TransportMode::Hid,
        }
    }
}

impl FromStr for DevicePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(HID_DEVICE_PATH) {
            Ok(DevicePath::Hid)
        } else {
            Ok(DevicePath::Bridge(s.to_string()))
        }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePath::Bridge(path) => f.write_str(path),
            DevicePath::Hid => f.write_str(HID_DEVICE_PATH),
        }
    }
}

/// Bit marking a hardened keypath level
pub const HARDENED: u32 = 0x8000_0000;

/// Device path sentinel selecting the direct HID transport
pub const HID_DEVICE_PATH: &str = "WEBHID";

/// BitBoxBridge endpoints
pub const BRIDGE_DISCOVERY_URL: &str = "http://localhost:8178";
pub const BRIDGE_SOCKET_URL: &str = "ws://127.0.0.1:8178/api/v1/socket";

/// Bridge discovery retry policy
pub const DISCOVERY_ATTEMPTS: u32 = 10;
pub const DISCOVERY_RETRY_INTERVAL_MS: u64 = 100;

/// USB identifiers of the BitBox02
pub const BITBOX02_VENDOR_ID: u16 = 0x03eb;
pub const BITBOX02_PRODUCT_ID: u16 = 0x2403;
pub const BITBOX02_PRODUCT_NAME: &str = "BitBox02";

/// HID report size in bytes, excluding the report id
pub const HID_REPORT_SIZE: usize = 64;

/// Firmware error code for a user abort on the device
pub const ERR_USER_ABORT: i32 = 104;

/// Length of an ECDSA signature without recovery id
pub const SIGNATURE_LEN: usize = 64;

/// Where to reach the BitBoxBridge service and how patiently to discover devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Base URL of the HTTP API, without the `/api/v1` suffix
    pub discovery_url: String,
    /// Websocket URL prefix; the device path is appended
    pub socket_url: String,
    pub attempts: u32,
    pub retry_interval: Duration,
}

impl BridgeConfig {
    pub fn with_discovery_url(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            ..Default::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_url: BRIDGE_DISCOVERY_URL.to_string(),
            socket_url: BRIDGE_SOCKET_URL.to_string(),
            attempts: DISCOVERY_ATTEMPTS,
            retry_interval: Duration::from_millis(DISCOVERY_RETRY_INTERVAL_MS),
        }
    }
}
