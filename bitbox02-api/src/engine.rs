//! Call surface of the device engine
//!
//! The engine owns the encrypted channel, the attestation check and the
//! device wire format. This crate never looks inside it: it feeds the engine
//! inbound bytes, hands it a writer for outbound bytes, and drives it through
//! the methods below.
//!
//! Every asynchronous engine method takes a [`Completion`] that the engine
//! invokes exactly once with either the result or an [`EngineError`]. The
//! engine serializes request framing itself.

use crate::keypath::Keypath;
use crate::messages::{
    BtcInput, BtcSignMessageResponse, BtcSignOutput, CardanoScriptConfig,
    CardanoSignTransactionRequest, CardanoSignTransactionResponse, MultisigAccount,
};
use crate::types::{
    BtcCoin, BtcSimpleType, BtcXPubType, CardanoNetwork, ERR_USER_ABORT, EthCoin,
    EthPubOutputType, Product, Status, TransportMode,
};
use std::fmt;
use std::sync::Arc;

/// One-shot completion callback carrying the call's result.
pub type Completion<T> = Box<dyn FnOnce(Result<T, EngineError>) + Send + 'static>;

/// Callback receiving engine events.
pub type EventCallback = Box<dyn Fn(EngineEvent) + Send + Sync + 'static>;

/// Outbound byte sink the engine writes framed requests to.
pub type Writer = Arc<dyn Fn(&[u8]) -> crate::Result<()> + Send + Sync + 'static>;

/// Notifications pushed by the engine while it processes inbound bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    StatusChanged(Status),
    AttestationCheckDone(bool),
    ChannelHashChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Error reported by the device firmware, with a firmware error code
    Firmware,
    /// Any other failure inside the engine
    Generic,
}

/// Error value handed to a [`Completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn firmware(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Firmware,
            code,
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::Generic,
            code: 0,
            message: message.into(),
        }
    }

    /// The user aborted the operation on the device.
    pub fn is_abort(&self) -> bool {
        self.kind == EngineErrorKind::Firmware && self.code == ERR_USER_ABORT
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EngineErrorKind::Firmware => write!(f, "{} (firmware code {})", self.message, self.code),
            EngineErrorKind::Generic => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// The opaque device engine.
pub trait DeviceEngine: Send + Sync {
    /// Last known device status.
    fn status(&self) -> Status;
    fn product(&self) -> Product;
    /// Pairing code shown to the user, and whether the device confirmed it.
    fn channel_hash(&self) -> (String, bool);
    /// Result of the attestation check, once it has run.
    fn attestation(&self) -> Option<bool>;
    /// Firmware version of the device.
    fn version(&self) -> String;

    /// Replace the event callback.
    fn set_on_event(&self, callback: EventCallback);
    /// Feed bytes received from the transport.
    fn on_read(&self, bytes: &[u8]);

    fn init(&self, done: Completion<()>);
    fn channel_hash_verify(&self, ok: bool, done: Completion<()>);

    fn btc_xpub(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        xpub_type: BtcXPubType,
        display: bool,
        done: Completion<String>,
    );
    fn btc_address_simple(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        simple_type: BtcSimpleType,
        display: bool,
        done: Completion<String>,
    );
    #[allow(clippy::too_many_arguments)]
    fn btc_sign_simple(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath_account: &Keypath,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        version: u32,
        locktime: u32,
        done: Completion<Vec<Vec<u8>>>,
    );
    fn btc_sign_message(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath: &Keypath,
        message: &[u8],
        done: Completion<BtcSignMessageResponse>,
    );
    fn btc_is_script_config_registered(&self, account: &MultisigAccount, done: Completion<bool>);
    fn btc_register_script_config(
        &self,
        account: &MultisigAccount,
        name: &str,
        done: Completion<()>,
    );
    fn btc_address_multisig(
        &self,
        account: &MultisigAccount,
        keypath: &Keypath,
        display: bool,
        done: Completion<String>,
    );
    fn btc_sign_multisig(
        &self,
        account: &MultisigAccount,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        version: u32,
        locktime: u32,
        done: Completion<Vec<Vec<u8>>>,
    );

    fn eth_pub(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        output_type: EthPubOutputType,
        display: bool,
        contract_address: &[u8],
        done: Completion<String>,
    );
    /// Signs a legacy transaction; the result is `r || s || recovery id`.
    #[allow(clippy::too_many_arguments)]
    fn eth_sign(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        nonce: &[u8],
        gas_price: &[u8],
        gas_limit: &[u8],
        recipient: &[u8],
        value: &[u8],
        data: &[u8],
        done: Completion<Vec<u8>>,
    );
    /// The result is `r || s || v` with the 27 offset already applied to `v`.
    fn eth_sign_message(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        message: &[u8],
        done: Completion<Vec<u8>>,
    );
    /// `typed_data` is the EIP-712 payload as JSON text.
    fn eth_sign_typed_message(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        typed_data: &str,
        done: Completion<Vec<u8>>,
    );

    fn cardano_xpubs(&self, keypaths: &[Keypath], done: Completion<Vec<Vec<u8>>>);
    fn cardano_address(
        &self,
        network: CardanoNetwork,
        script_config: &CardanoScriptConfig,
        display: bool,
        done: Completion<String>,
    );
    fn cardano_sign_transaction(
        &self,
        request: &CardanoSignTransactionRequest,
        done: Completion<CardanoSignTransactionResponse>,
    );
}

/// Builds an engine bound to a connection's outbound writer.
pub trait EngineFactory: Send + Sync {
    fn create(&self, mode: TransportMode, writer: Writer) -> Arc<dyn DeviceEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(TransportMode, Writer) -> Arc<dyn DeviceEngine> + Send + Sync,
{
    fn create(&self, mode: TransportMode, writer: Writer) -> Arc<dyn DeviceEngine> {
        self(mode, writer)
    }
}
