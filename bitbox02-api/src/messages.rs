//! Request and response structures exchanged with the device engine
//!
//! Caller-facing requests leave optional fields as `Option`. The engine's
//! parameter decoder needs every field physically present, so the
//! `*Sign*Request`/`*SignOutput` forms are the canonical versions with defaults
//! filled in.

use crate::keypath::Keypath;
use crate::types::{BtcCoin, BtcOutputType, CardanoNetwork};
use serde::{Deserialize, Serialize};

/// 64 byte compact signature, one per signed input
pub type BtcSignature = [u8; 64];

// --- Bitcoin ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcInput {
    pub prev_out_hash: [u8; 32],
    pub prev_out_index: u32,
    /// Satoshis
    pub prev_out_value: u64,
    /// Usually `0xFFFF_FFFF`
    pub sequence: u32,
    /// Usually the account keypath followed by `<change>/<address>`
    pub keypath: Keypath,
}

/// A transaction output, either our own change or an external payment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcOutput {
    pub ours: bool,
    /// Satoshis
    pub value: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<BtcOutputType>,
    /// Pubkey hash or script hash: 20 bytes for P2PKH, P2SH, P2WPKH; 32 bytes for P2WSH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypath: Option<Keypath>,
}

impl BtcOutput {
    /// Change output paying back into the account.
    pub fn change(keypath: Keypath, value: u64) -> Self {
        Self {
            ours: true,
            value,
            keypath: Some(keypath),
            ..Default::default()
        }
    }

    /// Output paying to an external script.
    pub fn external(output_type: BtcOutputType, payload: Vec<u8>, value: u64) -> Self {
        Self {
            ours: false,
            value,
            output_type: Some(output_type),
            payload: Some(payload),
            keypath: None,
        }
    }
}

/// Output with every field present, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcSignOutput {
    pub ours: bool,
    #[serde(rename = "type")]
    pub output_type: BtcOutputType,
    pub value: u64,
    pub payload: Vec<u8>,
    pub keypath: Keypath,
}

impl From<&BtcOutput> for BtcSignOutput {
    fn from(output: &BtcOutput) -> Self {
        Self {
            ours: output.ours,
            output_type: output.output_type.unwrap_or_default(),
            value: output.value,
            payload: output.payload.clone().unwrap_or_default(),
            keypath: output.keypath.clone().unwrap_or_default(),
        }
    }
}

/// Multisig account, registered on the device under a user chosen name.
///
/// Only P2WSH multisig on `m/48'/<coin>'/<account>'/2'` is supported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigAccount {
    pub coin: BtcCoin,
    pub keypath_account: Keypath,
    pub threshold: u32,
    /// Account-level xpubs in any format; one of them belongs to the connected device
    pub xpubs: Vec<String>,
    pub our_xpub_index: u32,
}

/// Raw message signature as returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcSignMessageResponse {
    pub signature: Vec<u8>,
    #[serde(rename = "recID")]
    pub rec_id: u8,
    pub electrum_signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcMessageSignature {
    pub signature: [u8; 64],
    pub rec_id: u8,
    /// 65 byte signature in the Electrum message format (header byte + r + s)
    pub electrum_signature: [u8; 65],
}

// --- Ethereum ---

/// Legacy transaction fields as big-endian byte strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTx {
    pub nonce: Vec<u8>,
    pub gas_price: Vec<u8>,
    pub gas_limit: Vec<u8>,
    /// 20 byte recipient address
    pub to: Vec<u8>,
    pub value: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTransaction {
    /// e.g. `m/44'/60'/0'/0/0`
    pub keypath: String,
    /// 1, 3 or 4 for mainnet, Ropsten and Rinkeby
    pub chain_id: i64,
    pub tx: EthTx,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthMessage {
    pub keypath: String,
    pub message: Vec<u8>,
}

/// EIP-712 typed data to be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTypedMessage {
    pub chain_id: i64,
    pub keypath: String,
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Big-endian, without leading zero bytes
    pub v: Vec<u8>,
}

// --- Cardano ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoInput {
    pub keypath: Keypath,
    pub prev_out_hash: Vec<u8>,
    pub prev_out_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardanoScriptConfig {
    /// Payment key hash with stake key hash
    #[serde(rename_all = "camelCase")]
    PkhSkh {
        keypath_payment: Keypath,
        keypath_stake: Keypath,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoToken {
    pub asset_name: Vec<u8>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoAssetGroup {
    pub policy_id: Vec<u8>,
    pub tokens: Vec<CardanoToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoOutput {
    pub encoded_address: String,
    /// Lovelace
    pub value: u64,
    /// Set when the output pays to one of our own addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_config: Option<CardanoScriptConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_groups: Option<Vec<CardanoAssetGroup>>,
}

/// Output with every field present, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoSignOutput {
    pub encoded_address: String,
    pub value: u64,
    pub script_config: Option<CardanoScriptConfig>,
    pub asset_groups: Vec<CardanoAssetGroup>,
}

impl From<&CardanoOutput> for CardanoSignOutput {
    fn from(output: &CardanoOutput) -> Self {
        Self {
            encoded_address: output.encoded_address.clone(),
            value: output.value,
            script_config: output.script_config.clone(),
            asset_groups: output.asset_groups.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardanoCertificate {
    StakeRegistration {
        keypath: Keypath,
    },
    StakeDeregistration {
        keypath: Keypath,
    },
    #[serde(rename_all = "camelCase")]
    StakeDelegation {
        keypath: Keypath,
        pool_keyhash: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardanoWithdrawal {
    pub keypath: Keypath,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoTransaction {
    pub network: CardanoNetwork,
    #[serde(default)]
    pub inputs: Vec<CardanoInput>,
    #[serde(default)]
    pub outputs: Vec<CardanoOutput>,
    pub fee: u64,
    /// Time-to-live slot; `None` means no ttl
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub certificates: Vec<CardanoCertificate>,
    #[serde(default)]
    pub withdrawals: Vec<CardanoWithdrawal>,
    #[serde(default)]
    pub validity_interval_start: Option<u64>,
}

/// Transaction with every field present, as handed to the engine.
///
/// The engine treats `ttl == 0` as "no ttl" unless `allow_zero_ttl` is set,
/// so an absent ttl is sent as `0` with the flag cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoSignTransactionRequest {
    pub network: CardanoNetwork,
    pub inputs: Vec<CardanoInput>,
    pub outputs: Vec<CardanoSignOutput>,
    pub fee: u64,
    pub ttl: u64,
    pub allow_zero_ttl: bool,
    pub certificates: Vec<CardanoCertificate>,
    pub withdrawals: Vec<CardanoWithdrawal>,
    pub validity_interval_start: u64,
}

impl From<&CardanoTransaction> for CardanoSignTransactionRequest {
    fn from(tx: &CardanoTransaction) -> Self {
        Self {
            network: tx.network,
            inputs: tx.inputs.clone(),
            outputs: tx.outputs.iter().map(CardanoSignOutput::from).collect(),
            fee: tx.fee,
            ttl: tx.ttl.unwrap_or(0),
            allow_zero_ttl: tx.ttl.is_some(),
            certificates: tx.certificates.clone(),
            withdrawals: tx.withdrawals.clone(),
            validity_interval_start: tx.validity_interval_start.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelleyWitness {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardanoSignTransactionResponse {
    pub shelley_witnesses: Vec<ShelleyWitness>,
}
