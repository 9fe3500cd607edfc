//! Pairing handshake and session lifecycle

use crate::adapter::EngineAdapter;
use crate::connection::Connection;
use crate::engine::{EngineEvent, EngineFactory, Writer};
use crate::error::{Error, Result};
use crate::transport::{Connector, DefaultConnector, OpenedChannel};
use crate::types::{DevicePath, Product, Status};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingDeviceInit,
    AwaitingUserVerification,
    Paired,
    Ready,
    Closed,
    PairingFailed,
    FirmwareUpgradeRequired,
    AppUpgradeRequired,
    Uninitialized,
}

impl SessionState {
    /// Failure states that survive the connection closing.
    pub fn is_terminal_error(&self) -> bool {
        matches!(
            self,
            SessionState::PairingFailed
                | SessionState::FirmwareUpgradeRequired
                | SessionState::AppUpgradeRequired
                | SessionState::Uninitialized
        )
    }

    fn into_error(self) -> Error {
        match self {
            SessionState::FirmwareUpgradeRequired => Error::FirmwareUpgradeRequired,
            SessionState::AppUpgradeRequired => Error::AppUpgradeRequired,
            SessionState::Uninitialized => Error::UninitializedDevice,
            SessionState::PairingFailed => Error::PairingRejected,
            _ => Error::NotConnected,
        }
    }
}

/// Callbacks the caller supplies to [`Session::connect`].
#[async_trait]
pub trait ConnectHandler: Send + Sync {
    /// Display the pairing code so the user can compare it with the device screen.
    fn show_pairing(&self, code: &str);

    /// Resolve once the user has confirmed (true) or rejected (false) the
    /// pairing code on the host side.
    async fn user_verify(&self) -> bool;

    fn attestation_result(&self, ok: bool);

    /// The connection closed, locally or because the device went away.
    fn on_close(&self) {}

    fn status_changed(&self, _status: Status) {}
}

struct Active {
    adapter: EngineAdapter,
    connection: Arc<Connection>,
    pump: JoinHandle<()>,
}

impl Active {
    fn close(&self) -> bool {
        let closed = self.connection.close();
        self.pump.abort();
        closed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(slot: &Mutex<SessionState>, state: SessionState) {
    let mut current = lock(slot);
    if *current != state {
        debug!("Session state {:?} -> {state:?}", *current);
        *current = state;
    }
}

/// A paired, encrypted session with one BitBox02.
pub struct Session {
    device_path: DevicePath,
    factory: Arc<dyn EngineFactory>,
    connector: Arc<dyn Connector>,
    state: Arc<Mutex<SessionState>>,
    active: Mutex<Option<Arc<Active>>>,
}

/// Create a session for `device_path`. Nothing is opened until
/// [`Session::connect`].
pub fn open(device_path: DevicePath, factory: impl EngineFactory + 'static) -> Session {
    Session::new(device_path, factory)
}

impl Session {
    pub fn new(device_path: DevicePath, factory: impl EngineFactory + 'static) -> Self {
        Self {
            device_path,
            factory: Arc::new(factory),
            connector: Arc::new(DefaultConnector::default()),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            active: Mutex::new(None),
        }
    }

    /// Use a different transport connector.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn device_path(&self) -> &DevicePath {
        &self.device_path
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|active| active.connection.is_valid())
    }

    /// Open the transport and run the pairing handshake.
    pub async fn connect(&self, handler: Arc<dyn ConnectHandler>) -> Result<()> {
        if self.is_connected() {
            return Err(Error::ConnectionError("Session already connected".to_string()));
        }

        set_state(&self.state, SessionState::Connecting);
        info!("Connecting to BitBox02 at {}", self.device_path);
        let OpenedChannel {
            channel,
            mut inbound,
        } = match self.connector.open(&self.device_path).await {
            Ok(opened) => opened,
            Err(e) => {
                set_state(&self.state, SessionState::Disconnected);
                return Err(e);
            }
        };

        let close_state = self.state.clone();
        let close_handler = handler.clone();
        let connection = Arc::new(Connection::new(channel, move || {
            info!("BitBox02 connection closed");
            {
                let mut state = lock(&close_state);
                if !state.is_terminal_error() {
                    *state = SessionState::Closed;
                }
            }
            close_handler.on_close();
        }));

        let write_conn = Arc::downgrade(&connection);
        let writer: Writer = Arc::new(move |bytes: &[u8]| match write_conn.upgrade() {
            Some(conn) => conn.write(bytes),
            None => Err(Error::NotConnected),
        });
        let engine = self.factory.create(self.device_path.mode(), writer);

        let terminal: Arc<Mutex<Option<SessionState>>> = Arc::new(Mutex::new(None));
        {
            let weak_engine = Arc::downgrade(&engine);
            let conn = Arc::downgrade(&connection);
            let handler = handler.clone();
            let terminal = terminal.clone();
            let state = self.state.clone();
            engine.set_on_event(Box::new(move |event| match event {
                EngineEvent::StatusChanged(status) => {
                    debug!("Device status changed: {status}");
                    handler.status_changed(status);
                    let failure = match status {
                        Status::RequireFirmwareUpgrade => Some(SessionState::FirmwareUpgradeRequired),
                        Status::RequireAppUpgrade => Some(SessionState::AppUpgradeRequired),
                        Status::Uninitialized => Some(SessionState::Uninitialized),
                        _ => None,
                    };
                    if let Some(failure) = failure {
                        warn!("BitBox02 cannot be used: {status}");
                        *lock(&terminal) = Some(failure);
                        set_state(&state, failure);
                        if let Some(conn) = conn.upgrade() {
                            conn.close();
                        }
                    } else if status == Status::Unpaired {
                        if let Some(engine) = weak_engine.upgrade() {
                            let (code, _) = engine.channel_hash();
                            handler.show_pairing(&code);
                        }
                    }
                }
                EngineEvent::AttestationCheckDone(ok) => {
                    if !ok {
                        warn!("BitBox02 attestation check failed");
                    }
                    handler.attestation_result(ok);
                }
                EngineEvent::ChannelHashChanged => debug!("Channel hash changed"),
            }));
        }

        let pump_engine = engine.clone();
        let pump_conn = connection.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.recv() => match frame {
                        Some(frame) => pump_engine.on_read(&frame),
                        None => {
                            info!("BitBox02 disconnected");
                            break;
                        }
                    },
                    _ = pump_conn.closed() => break,
                }
            }
            pump_conn.mark_closed();
        });

        let active = Arc::new(Active {
            adapter: EngineAdapter::new(engine, connection.clone()),
            connection,
            pump,
        });
        *lock(&self.active) = Some(active.clone());

        match self.handshake(&active, handler.as_ref()).await {
            Ok(()) => {
                set_state(&self.state, SessionState::Paired);
                info!("BitBox02 paired");
                set_state(&self.state, SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                active.close();
                // A status event that closed the connection explains the failure
                let e = lock(&terminal).take().map_or(e, SessionState::into_error);
                warn!("BitBox02 handshake failed: {e}");
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        active: &Active,
        handler: &dyn ConnectHandler,
    ) -> Result<()> {
        let adapter = &active.adapter;
        set_state(&self.state, SessionState::AwaitingDeviceInit);

        adapter.init().await?;

        let status = adapter.status()?;
        debug!("Device status after init: {status}");
        match status {
            Status::PairingFailed => {
                set_state(&self.state, SessionState::PairingFailed);
                Err(Error::PairingRejected)
            }
            Status::Unpaired => {
                set_state(&self.state, SessionState::AwaitingUserVerification);
                let verified = tokio::select! {
                    verified = handler.user_verify() => verified,
                    _ = active.connection.closed() => {
                        info!("BitBox02 went away during pairing verification");
                        return Err(Error::NotConnected);
                    }
                };
                if verified {
                    adapter.channel_hash_verify(true).await?;
                    Ok(())
                } else {
                    info!("Pairing code rejected on the host");
                    if let Err(e) = adapter.channel_hash_verify(false).await {
                        debug!("Rejecting channel hash failed: {e}");
                    }
                    set_state(&self.state, SessionState::PairingFailed);
                    Err(Error::PairingRejected)
                }
            }
            Status::Initialized => Ok(()),
            other => Err(Error::UnexpectedStatus(other)),
        }
    }

    /// Close the connection. Returns false if the session was never opened
    /// or is already closed.
    pub fn close(&self) -> bool {
        let active = lock(&self.active).clone();
        match active {
            Some(active) => active.close(),
            None => false,
        }
    }

    /// Adapter of the live connection.
    pub(crate) fn adapter(&self) -> Result<EngineAdapter> {
        lock(&self.active)
            .as_ref()
            .filter(|active| active.connection.is_valid())
            .map(|active| active.adapter.clone())
            .ok_or(Error::NotConnected)
    }

    pub fn status(&self) -> Result<Status> {
        Ok(self.adapter()?.status()?)
    }

    pub fn product(&self) -> Result<Product> {
        Ok(self.adapter()?.product()?)
    }

    /// Firmware version reported by the device.
    pub fn version(&self) -> Result<String> {
        Ok(self.adapter()?.version()?)
    }

    /// Pairing code of the current channel.
    pub fn channel_hash(&self) -> Result<String> {
        Ok(self.adapter()?.channel_hash()?.0)
    }

    /// Attestation result, once the check has run.
    pub fn attestation(&self) -> Result<Option<bool>> {
        Ok(self.adapter()?.attestation()?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.active).take() {
            active.close();
        }
    }
}
