//! In-memory transport for tests

use super::{Channel, Connector, OpenedChannel};
use crate::error::{Error, Result};
use crate::types::DevicePath;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Channel that records every frame written to it.
#[derive(Default)]
pub struct MockChannel {
    writes: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Channel for MockChannel {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Test-side handle to an opened mock channel.
#[derive(Clone)]
pub struct MockLink {
    pub channel: Arc<MockChannel>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl MockLink {
    /// Push a frame as if the device had sent it.
    pub fn deliver(&self, bytes: &[u8]) -> bool {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(bytes.to_vec()).is_ok())
    }

    /// Simulate the device being unplugged.
    pub fn disconnect(&self) {
        self.channel.close();
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.channel.writes()
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }
}

/// Connector handing out [`MockChannel`]s.
#[derive(Default)]
pub struct MockConnector {
    refuse: bool,
    opens: AtomicUsize,
    last: Mutex<Option<MockLink>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every open fails like a busy device.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Handle to the most recently opened channel.
    pub fn link(&self) -> Option<MockLink> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _path: &DevicePath) -> Result<OpenedChannel> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(Error::ConnectionError("Your BitBox02 is busy".to_string()));
        }

        let channel = Arc::new(MockChannel::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let link = MockLink {
            channel: channel.clone(),
            inbound: Arc::new(Mutex::new(Some(tx))),
        };
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(link);

        Ok(OpenedChannel {
            channel,
            inbound: rx,
        })
    }
}
