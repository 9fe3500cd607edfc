//! Future-returning wrapper around the device engine's completion callbacks

use crate::connection::Connection;
use crate::engine::{Completion, DeviceEngine, EngineError};
use crate::error::Error;
use crate::keypath::Keypath;
use crate::messages::{
    BtcInput, BtcSignMessageResponse, BtcSignOutput, CardanoScriptConfig,
    CardanoSignTransactionRequest, CardanoSignTransactionResponse, MultisigAccount,
};
use crate::types::{
    BtcCoin, BtcSimpleType, BtcXPubType, CardanoNetwork, EthCoin, EthPubOutputType, Product,
    Status,
};
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Failure of a single adapted engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The connection was closed before or while the call was in flight
    NotConnected,
    Engine(EngineError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::NotConnected => f.write_str("not connected"),
            CallError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CallError {}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        match err {
            CallError::NotConnected => Error::NotConnected,
            CallError::Engine(e) if e.is_abort() => Error::UserAbort,
            CallError::Engine(e) => Error::DeviceError(e.message),
        }
    }
}

pub type CallResult<T> = std::result::Result<T, CallError>;

/// Engine handle bound to one connection.
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn DeviceEngine>,
    connection: Arc<Connection>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn DeviceEngine>, connection: Arc<Connection>) -> Self {
        Self { engine, connection }
    }

    pub fn engine(&self) -> &Arc<dyn DeviceEngine> {
        &self.engine
    }

    fn ensure_connected(&self) -> CallResult<()> {
        if self.connection.is_valid() {
            Ok(())
        } else {
            Err(CallError::NotConnected)
        }
    }

    /// Start an engine call and wait for its completion or for the
    /// connection to close, whichever comes first.
    pub async fn call<T, F>(&self, name: &str, start: F) -> CallResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DeviceEngine, Completion<T>),
    {
        self.ensure_connected()?;
        debug!("Engine call: {name}");

        let (tx, rx) = oneshot::channel();
        let done: Completion<T> = Box::new(move |result| {
            let _ = tx.send(result);
        });
        start(self.engine.as_ref(), done);

        tokio::select! {
            biased;
            result = rx => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    debug!("Engine call {name} failed: {e}");
                    Err(CallError::Engine(e))
                }
                Err(_) => Err(CallError::NotConnected),
            },
            _ = self.connection.closed() => {
                debug!("Connection closed during engine call {name}");
                Err(CallError::NotConnected)
            }
        }
    }

    pub fn status(&self) -> CallResult<Status> {
        self.ensure_connected()?;
        Ok(self.engine.status())
    }

    pub fn product(&self) -> CallResult<Product> {
        self.ensure_connected()?;
        Ok(self.engine.product())
    }

    pub fn channel_hash(&self) -> CallResult<(String, bool)> {
        self.ensure_connected()?;
        Ok(self.engine.channel_hash())
    }

    pub fn attestation(&self) -> CallResult<Option<bool>> {
        self.ensure_connected()?;
        Ok(self.engine.attestation())
    }

    pub fn version(&self) -> CallResult<String> {
        self.ensure_connected()?;
        Ok(self.engine.version())
    }

    pub async fn init(&self) -> CallResult<()> {
        self.call("init", |e, done| e.init(done)).await
    }

    pub async fn channel_hash_verify(&self, ok: bool) -> CallResult<()> {
        self.call("channel_hash_verify", |e, done| e.channel_hash_verify(ok, done))
            .await
    }

    pub async fn btc_xpub(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        xpub_type: BtcXPubType,
        display: bool,
    ) -> CallResult<String> {
        self.call("btc_xpub", |e, done| {
            e.btc_xpub(coin, keypath, xpub_type, display, done)
        })
        .await
    }

    pub async fn btc_address_simple(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        simple_type: BtcSimpleType,
        display: bool,
    ) -> CallResult<String> {
        self.call("btc_address_simple", |e, done| {
            e.btc_address_simple(coin, keypath, simple_type, display, done)
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn btc_sign_simple(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath_account: &Keypath,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        version: u32,
        locktime: u32,
    ) -> CallResult<Vec<Vec<u8>>> {
        self.call("btc_sign_simple", |e, done| {
            e.btc_sign_simple(
                coin,
                simple_type,
                keypath_account,
                inputs,
                outputs,
                version,
                locktime,
                done,
            )
        })
        .await
    }

    pub async fn btc_sign_message(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath: &Keypath,
        message: &[u8],
    ) -> CallResult<BtcSignMessageResponse> {
        self.call("btc_sign_message", |e, done| {
            e.btc_sign_message(coin, simple_type, keypath, message, done)
        })
        .await
    }

    pub async fn btc_is_script_config_registered(
        &self,
        account: &MultisigAccount,
    ) -> CallResult<bool> {
        self.call("btc_is_script_config_registered", |e, done| {
            e.btc_is_script_config_registered(account, done)
        })
        .await
    }

    pub async fn btc_register_script_config(
        &self,
        account: &MultisigAccount,
        name: &str,
    ) -> CallResult<()> {
        self.call("btc_register_script_config", |e, done| {
            e.btc_register_script_config(account, name, done)
        })
        .await
    }

    pub async fn btc_address_multisig(
        &self,
        account: &MultisigAccount,
        keypath: &Keypath,
        display: bool,
    ) -> CallResult<String> {
        self.call("btc_address_multisig", |e, done| {
            e.btc_address_multisig(account, keypath, display, done)
        })
        .await
    }

    pub async fn btc_sign_multisig(
        &self,
        account: &MultisigAccount,
        inputs: &[BtcInput],
        outputs: &[BtcSignOutput],
        version: u32,
        locktime: u32,
    ) -> CallResult<Vec<Vec<u8>>> {
        self.call("btc_sign_multisig", |e, done| {
            e.btc_sign_multisig(account, inputs, outputs, version, locktime, done)
        })
        .await
    }

    pub async fn eth_pub(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        output_type: EthPubOutputType,
        display: bool,
        contract_address: &[u8],
    ) -> CallResult<String> {
        self.call("eth_pub", |e, done| {
            e.eth_pub(coin, keypath, output_type, display, contract_address, done)
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn eth_sign(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        nonce: &[u8],
        gas_price: &[u8],
        gas_limit: &[u8],
        recipient: &[u8],
        value: &[u8],
        data: &[u8],
    ) -> CallResult<Vec<u8>> {
        self.call("eth_sign", |e, done| {
            e.eth_sign(
                coin, keypath, nonce, gas_price, gas_limit, recipient, value, data, done,
            )
        })
        .await
    }

    pub async fn eth_sign_message(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        message: &[u8],
    ) -> CallResult<Vec<u8>> {
        self.call("eth_sign_message", |e, done| {
            e.eth_sign_message(coin, keypath, message, done)
        })
        .await
    }

    pub async fn eth_sign_typed_message(
        &self,
        coin: EthCoin,
        keypath: &Keypath,
        typed_data: &str,
    ) -> CallResult<Vec<u8>> {
        self.call("eth_sign_typed_message", |e, done| {
            e.eth_sign_typed_message(coin, keypath, typed_data, done)
        })
        .await
    }

    pub async fn cardano_xpubs(&self, keypaths: &[Keypath]) -> CallResult<Vec<Vec<u8>>> {
        self.call("cardano_xpubs", |e, done| e.cardano_xpubs(keypaths, done))
            .await
    }

    pub async fn cardano_address(
        &self,
        network: CardanoNetwork,
        script_config: &CardanoScriptConfig,
        display: bool,
    ) -> CallResult<String> {
        self.call("cardano_address", |e, done| {
            e.cardano_address(network, script_config, display, done)
        })
        .await
    }

    pub async fn cardano_sign_transaction(
        &self,
        request: &CardanoSignTransactionRequest,
    ) -> CallResult<CardanoSignTransactionResponse> {
        self.call("cardano_sign_transaction", |e, done| {
            e.cardano_sign_transaction(request, done)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ERR_USER_ABORT;

    #[test]
    fn test_abort_maps_to_user_abort() {
        let err: Error = CallError::Engine(EngineError::firmware(ERR_USER_ABORT, "aborted")).into();
        assert!(matches!(err, Error::UserAbort));
        assert!(crate::is_error_abort(&err));
    }

    #[test]
    fn test_other_errors_keep_message() {
        let err: Error = CallError::Engine(EngineError::firmware(101, "invalid input")).into();
        assert!(matches!(err, Error::DeviceError(ref m) if m == "invalid input"));

        // Code 104 only counts as an abort when the firmware reports it
        let err: Error = CallError::Engine(EngineError {
            kind: crate::engine::EngineErrorKind::Generic,
            code: ERR_USER_ABORT,
            message: "transport".into(),
        })
        .into();
        assert!(matches!(err, Error::DeviceError(_)));
        assert!(!crate::is_error_abort(&err));
    }

    #[test]
    fn test_not_connected() {
        let err: Error = CallError::NotConnected.into();
        assert!(matches!(err, Error::NotConnected));
    }
}
