use crate::error::{Error, Result};
use crate::keypath::{coin_from_chain_id, coin_from_keypath, parse_keypath};
use crate::messages::{EthMessage, EthSignature, EthTransaction, EthTypedMessage};
use crate::session::Session;
use crate::types::{EthPubOutputType, SIGNATURE_LEN};
use log::{debug, info};

/// Replay-protected `v` for a legacy transaction signature, big-endian with
/// leading zero bytes removed.
fn eip155_v(rec_id: u8, chain_id: i64) -> Vec<u8> {
    let v = u64::from(rec_id) + 27 + chain_id.unsigned_abs() * 2 + 8;
    let bytes = v.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// Split `r || s || tail` into r, s and the trailing bytes.
fn split_signature(sig: &[u8]) -> Result<([u8; 32], [u8; 32], &[u8])> {
    if sig.len() <= SIGNATURE_LEN {
        return Err(Error::DeviceError(format!(
            "signature too short: {} bytes",
            sig.len()
        )));
    }
    let (rs, tail) = sig.split_at(SIGNATURE_LEN);
    let (r, s) = rs.split_at(32);
    let to_array = |half: &[u8]| -> Result<[u8; 32]> {
        half.try_into()
            .map_err(|_| Error::DeviceError("malformed signature".to_string()))
    };
    Ok((to_array(r)?, to_array(s)?, tail))
}

impl Session {
    /// Get the account xpub for a keypath like `m/44'/60'/0'/0`.
    pub async fn eth_get_root_pub_key(&self, keypath: &str) -> Result<String> {
        let keypath = parse_keypath(keypath)?;
        let coin = coin_from_keypath(&keypath)?;
        debug!("Getting ETH xpub for {keypath}");
        Ok(self
            .adapter()?
            .eth_pub(coin, &keypath, EthPubOutputType::Xpub, false, &[])
            .await?)
    }

    /// Get an address for a keypath like `m/44'/60'/0'/0/0`.
    ///
    /// Testnet keypaths always label the address as Ropsten.
    pub async fn eth_display_address(&self, keypath: &str, display: bool) -> Result<String> {
        let keypath = parse_keypath(keypath)?;
        let coin = coin_from_keypath(&keypath)?;
        Ok(self
            .adapter()?
            .eth_pub(coin, &keypath, EthPubOutputType::Address, display, &[])
            .await?)
    }

    /// Sign a legacy transaction. `v` includes the EIP-155 chain offset.
    pub async fn eth_sign_transaction(&self, signing: &EthTransaction) -> Result<EthSignature> {
        let coin = coin_from_chain_id(signing.chain_id)?;
        let keypath = parse_keypath(&signing.keypath)?;
        info!("Signing ETH transaction on chain {}", signing.chain_id);

        let tx = &signing.tx;
        let sig = self
            .adapter()?
            .eth_sign(
                coin,
                &keypath,
                &tx.nonce,
                &tx.gas_price,
                &tx.gas_limit,
                &tx.to,
                &tx.value,
                &tx.data,
            )
            .await?;
        if sig.len() != SIGNATURE_LEN + 1 {
            return Err(Error::DeviceError(format!(
                "expected 65 byte signature, got {} bytes",
                sig.len()
            )));
        }

        let (r, s, tail) = split_signature(&sig)?;
        Ok(EthSignature {
            r,
            s,
            v: eip155_v(tail[0], signing.chain_id),
        })
    }

    pub async fn eth_sign_message(&self, message: &EthMessage) -> Result<EthSignature> {
        let keypath = parse_keypath(&message.keypath)?;
        let coin = coin_from_keypath(&keypath)?;
        debug!("Signing {} byte ETH message", message.message.len());

        let sig = self
            .adapter()?
            .eth_sign_message(coin, &keypath, &message.message)
            .await?;
        let (r, s, v) = split_signature(&sig)?;
        Ok(EthSignature { r, s, v: v.to_vec() })
    }

    /// Sign EIP-712 typed data.
    pub async fn eth_sign_typed_message(&self, message: &EthTypedMessage) -> Result<EthSignature> {
        let coin = coin_from_chain_id(message.chain_id)?;
        let keypath = parse_keypath(&message.keypath)?;
        let typed_data = serde_json::to_string(&message.message)?;
        debug!("Signing typed message on chain {}", message.chain_id);

        let sig = self
            .adapter()?
            .eth_sign_typed_message(coin, &keypath, &typed_data)
            .await?;
        let (r, s, v) = split_signature(&sig)?;
        Ok(EthSignature { r, s, v: v.to_vec() })
    }
}
