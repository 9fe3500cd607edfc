//! Liveness tracking for one open transport

use crate::error::{Error, Result};
use crate::transport::Channel;
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// One open duplex channel plus a close signal.
///
/// The connection is valid from creation until it is closed locally or the
/// transport reports a disconnect. The close callback runs exactly once,
/// whichever happens first.
pub struct Connection {
    channel: Arc<dyn Channel>,
    valid: watch::Sender<bool>,
    on_close: Mutex<Option<CloseCallback>>,
}

impl Connection {
    pub fn new(channel: Arc<dyn Channel>, on_close: impl FnOnce() + Send + 'static) -> Self {
        let (valid, _) = watch::channel(true);
        Self {
            channel,
            valid,
            on_close: Mutex::new(Some(Box::new(on_close))),
        }
    }

    pub fn is_valid(&self) -> bool {
        *self.valid.borrow()
    }

    /// Send bytes to the device.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::NotConnected);
        }
        self.channel.write(bytes)
    }

    /// Close the channel. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.channel.close();
        self.mark_closed();
        true
    }

    /// Record that the transport went away.
    pub fn mark_closed(&self) {
        let was_valid = self.valid.send_replace(false);
        if was_valid {
            debug!("Connection closed");
        }
        let callback = self
            .on_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Resolves once the connection is no longer valid.
    pub async fn closed(&self) {
        let mut rx = self.valid.subscribe();
        // Err means the sender is gone, which also means closed
        let _ = rx.wait_for(|valid| !*valid).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connection() -> (Connection, Arc<MockChannel>, Arc<AtomicUsize>) {
        let channel = Arc::new(MockChannel::default());
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = closes.clone();
        let conn = Connection::new(channel.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (conn, channel, closes)
    }

    #[test]
    fn test_close_twice() {
        let (conn, channel, closes) = connection();
        assert!(conn.is_valid());
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_valid());
        assert!(!channel.is_open());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_after_close_is_rejected() -> Result<()> {
        let (conn, channel, _) = connection();
        conn.write(&[1])?;
        conn.mark_closed();
        assert!(matches!(conn.write(&[2]), Err(Error::NotConnected)));
        assert_eq!(channel.writes(), vec![vec![1]]);
        Ok(())
    }

    #[test]
    fn test_remote_close_runs_callback_once() {
        let (conn, _, closes) = connection();
        conn.mark_closed();
        conn.mark_closed();
        assert!(!conn.close());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_resolves() {
        let (conn, _, _) = connection();
        let conn = Arc::new(conn);
        let waiter = tokio::spawn({
            let conn = conn.clone();
            async move { conn.closed().await }
        });
        conn.close();
        assert!(waiter.await.is_ok());
        // Already closed resolves immediately
        conn.closed().await;
    }
}
