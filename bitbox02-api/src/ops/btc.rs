use super::{input_signatures, validate_account_name};
use crate::error::{Error, Result};
use crate::keypath::Keypath;
use crate::messages::{
    BtcInput, BtcMessageSignature, BtcOutput, BtcSignOutput, BtcSignature, MultisigAccount,
};
use crate::session::Session;
use crate::types::{BtcCoin, BtcSimpleType, BtcXPubType};
use log::{debug, info};
use std::future::Future;

fn canonical_outputs(outputs: &[BtcOutput]) -> Vec<BtcSignOutput> {
    outputs.iter().map(BtcSignOutput::from).collect()
}

impl Session {
    /// Get an account-level xpub, e.g. for `m/84'/0'/0'`.
    pub async fn btc_xpub(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        xpub_type: BtcXPubType,
        display: bool,
    ) -> Result<String> {
        debug!("Getting {coin:?} xpub for {keypath}");
        Ok(self
            .adapter()?
            .btc_xpub(coin, keypath, xpub_type, display)
            .await?)
    }

    /// Get a single-sig address, shown on the device screen when `display` is set.
    pub async fn btc_display_address_simple(
        &self,
        coin: BtcCoin,
        keypath: &Keypath,
        simple_type: BtcSimpleType,
        display: bool,
    ) -> Result<String> {
        debug!("Getting {coin:?} {simple_type:?} address for {keypath}");
        Ok(self
            .adapter()?
            .btc_address_simple(coin, keypath, simple_type, display)
            .await?)
    }

    /// Sign a single-sig transaction. Returns one signature per input, in input order.
    #[allow(clippy::too_many_arguments)]
    pub async fn btc_sign_simple(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath_account: &Keypath,
        inputs: &[BtcInput],
        outputs: &[BtcOutput],
        version: u32,
        locktime: u32,
    ) -> Result<Vec<BtcSignature>> {
        info!(
            "Signing {coin:?} transaction with {} inputs and {} outputs",
            inputs.len(),
            outputs.len()
        );
        let outputs = canonical_outputs(outputs);
        let raw = self
            .adapter()?
            .btc_sign_simple(
                coin,
                simple_type,
                keypath_account,
                inputs,
                &outputs,
                version,
                locktime,
            )
            .await?;
        input_signatures(raw, inputs.len())
    }

    pub async fn btc_sign_message(
        &self,
        coin: BtcCoin,
        simple_type: BtcSimpleType,
        keypath: &Keypath,
        message: &[u8],
    ) -> Result<BtcMessageSignature> {
        debug!("Signing {} byte message with {keypath}", message.len());
        let response = self
            .adapter()?
            .btc_sign_message(coin, simple_type, keypath, message)
            .await?;

        let signature: [u8; 64] = response.signature.as_slice().try_into().map_err(|_| {
            Error::DeviceError(format!(
                "expected 64 byte signature, got {} bytes",
                response.signature.len()
            ))
        })?;
        let electrum_signature: [u8; 65] = response
            .electrum_signature
            .as_slice()
            .try_into()
            .map_err(|_| {
                Error::DeviceError(format!(
                    "expected 65 byte electrum signature, got {} bytes",
                    response.electrum_signature.len()
                ))
            })?;
        Ok(BtcMessageSignature {
            signature,
            rec_id: response.rec_id,
            electrum_signature,
        })
    }

    /// Register a multisig account unless the device already knows it.
    ///
    /// `get_name` is only awaited when registration is needed. The name must be
    /// 1 to 30 printable ASCII characters.
    pub async fn btc_maybe_register_script_config<F, Fut>(
        &self,
        account: &MultisigAccount,
        get_name: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        let adapter = self.adapter()?;
        if adapter.btc_is_script_config_registered(account).await? {
            debug!("Multisig account {} already registered", account.keypath_account);
            return Ok(());
        }

        let name = get_name().await;
        validate_account_name(&name)?;
        info!("Registering multisig account {name:?}");
        adapter.btc_register_script_config(account, &name).await?;
        Ok(())
    }

    /// Show a multisig address on the device. The account must be registered.
    pub async fn btc_display_address_multisig(
        &self,
        account: &MultisigAccount,
        keypath: &Keypath,
    ) -> Result<String> {
        Ok(self
            .adapter()?
            .btc_address_multisig(account, keypath, true)
            .await?)
    }

    /// Sign a multisig transaction. The account must be registered.
    pub async fn btc_sign_multisig(
        &self,
        account: &MultisigAccount,
        inputs: &[BtcInput],
        outputs: &[BtcOutput],
        version: u32,
        locktime: u32,
    ) -> Result<Vec<BtcSignature>> {
        info!(
            "Signing multisig transaction with {} inputs and {} outputs",
            inputs.len(),
            outputs.len()
        );
        let outputs = canonical_outputs(outputs);
        let raw = self
            .adapter()?
            .btc_sign_multisig(account, inputs, &outputs, version, locktime)
            .await?;
        input_signatures(raw, inputs.len())
    }
}
