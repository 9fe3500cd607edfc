//! Websocket transport through the BitBoxBridge service

use super::{Channel, OpenedChannel};
use crate::error::{Error, Result};
use crate::types::BridgeConfig;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Outbound half of a bridge websocket. Frames are queued to a writer task.
pub struct BridgeChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl Channel for BridgeChannel {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            warn!("Write on closed bridge socket dropped");
            return Err(Error::NotConnected);
        }
        trace!("bridge -> {}", hex::encode(bytes));
        self.outbound
            .send(Outbound::Frame(bytes.to_vec()))
            .map_err(|_| Error::NotConnected)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closing bridge socket");
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Open the bridge websocket for `device_path`.
pub async fn open(config: &BridgeConfig, device_path: &str) -> Result<OpenedChannel> {
    let url = format!("{}/{}", config.socket_url.trim_end_matches('/'), device_path);
    info!("Connecting to bridge socket {url}");

    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| {
            debug!("Bridge socket open failed: {e}");
            Error::ConnectionError("Your BitBox02 is busy".to_string())
        })?;
    let (mut sink, mut source) = stream.split();

    let open = Arc::new(AtomicBool::new(true));
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let writer_open = open.clone();
    tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Frame(bytes) => {
                    if let Err(e) = sink.send(Message::Binary(bytes)).await {
                        warn!("Bridge socket write failed: {e}");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
        writer_open.store(false, Ordering::SeqCst);
    });

    let reader_open = open.clone();
    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Binary(bytes)) => {
                    trace!("bridge <- {}", hex::encode(&bytes));
                    if in_tx.send(bytes).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!("Bridge socket closed by peer: {frame:?}");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Bridge socket read failed: {e}");
                    break;
                }
            }
        }
        reader_open.store(false, Ordering::SeqCst);
        // in_tx drops here, ending the inbound stream
    });

    Ok(OpenedChannel {
        channel: Arc::new(BridgeChannel {
            outbound: out_tx,
            open,
        }),
        inbound: in_rx,
    })
}
