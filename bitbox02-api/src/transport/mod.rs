//! Byte-stream transports to the device
//!
//! A transport delivers whole inbound frames through an unbounded channel and
//! accepts outbound frames through [`Channel::write`]. The inbound stream
//! ending means the device went away.

#[cfg(feature = "bridge")]
pub mod bridge;
#[cfg(feature = "hid")]
pub mod hid;
pub mod mock;

use crate::error::{Error, Result};
use crate::types::{BridgeConfig, DevicePath};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use mock::{MockChannel, MockConnector, MockLink};

/// Frames received from the device.
pub type Inbound = mpsc::UnboundedReceiver<Vec<u8>>;

/// Outbound half of an open duplex connection.
pub trait Channel: Send + Sync {
    /// Send one frame. Fails with [`Error::NotConnected`] once the channel is closed.
    fn write(&self, bytes: &[u8]) -> Result<()>;
    /// Close the channel. Closing twice is a no-op.
    fn close(&self);
    fn is_open(&self) -> bool;
}

/// A freshly opened channel together with its inbound frame stream.
pub struct OpenedChannel {
    pub channel: Arc<dyn Channel>,
    pub inbound: Inbound,
}

/// Opens a channel for a device path.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, path: &DevicePath) -> Result<OpenedChannel>;
}

/// Opens bridge websockets and direct HID devices.
#[derive(Debug, Clone, Default)]
pub struct DefaultConnector {
    pub bridge: BridgeConfig,
}

impl DefaultConnector {
    pub fn new(bridge: BridgeConfig) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, path: &DevicePath) -> Result<OpenedChannel> {
        debug!("Opening transport for {path}");
        match path {
            #[cfg(feature = "bridge")]
            DevicePath::Bridge(device_path) => bridge::open(&self.bridge, device_path).await,
            #[cfg(feature = "hid")]
            DevicePath::Hid => hid::open().await,
            #[allow(unreachable_patterns)]
            _ => Err(Error::ConnectionError(format!(
                "no transport compiled in for {path}"
            ))),
        }
    }
}
