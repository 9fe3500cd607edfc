//! BIP32-style keypaths and Ethereum network inference

use crate::error::{Error, Result};
use crate::types::{EthCoin, HARDENED};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Returns `index` with the hardened bit set.
pub const fn hardened(index: u32) -> u32 {
    index | HARDENED
}

/// Ordered derivation levels, e.g. `m/44'/60'/0'/0/0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keypath(Vec<u32>);

impl Keypath {
    /// The master key: no levels.
    pub fn master() -> Self {
        Self(Vec::new())
    }

    pub fn levels(&self) -> &[u32] {
        &self.0
    }

    /// New keypath with `level` appended.
    pub fn child(&self, level: u32) -> Self {
        let mut levels = self.0.clone();
        levels.push(level);
        Self(levels)
    }

    /// New keypath with all of `levels` appended.
    pub fn extend(&self, levels: &[u32]) -> Self {
        let mut out = self.0.clone();
        out.extend_from_slice(levels);
        Self(out)
    }
}

impl Deref for Keypath {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for Keypath {
    fn from(levels: Vec<u32>) -> Self {
        Self(levels)
    }
}

impl From<&[u32]> for Keypath {
    fn from(levels: &[u32]) -> Self {
        Self(levels.to_vec())
    }
}

impl FromStr for Keypath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_keypath(s)
    }
}

impl fmt::Display for Keypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for level in &self.0 {
            if level & HARDENED != 0 {
                write!(f, "/{}'", level & !HARDENED)?;
            } else {
                write!(f, "/{level}")?;
            }
        }
        Ok(())
    }
}

/// Parse a keypath string such as `m/44'/1'/0'/0`.
///
/// The master node `m` is mandatory and `m` alone yields an empty keypath.
/// Every level must be a decimal number below 2^31, optionally followed by
/// `'` to mark it hardened.
pub fn parse_keypath(path: &str) -> Result<Keypath> {
    let invalid = || Error::InvalidKeypath(path.to_string());

    let lowered = path.to_lowercase();
    let mut tokens = lowered.split('/');
    if tokens.next() != Some("m") {
        return Err(invalid());
    }

    let mut levels = Vec::new();
    for token in tokens {
        let (digits, is_hardened) = match token.strip_suffix('\'') {
            Some(stripped) => (stripped, true),
            None => (token, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index: u64 = digits.parse().map_err(|_| invalid())?;
        if index >= u64::from(HARDENED) {
            return Err(invalid());
        }
        let index = index as u32;
        levels.push(if is_hardened { hardened(index) } else { index });
    }

    Ok(Keypath(levels))
}

/// Map an Ethereum chain id to the device's coin identifier.
pub fn coin_from_chain_id(chain_id: i64) -> Result<EthCoin> {
    match chain_id {
        1 => Ok(EthCoin::Eth),
        3 => Ok(EthCoin::RopstenEth),
        4 => Ok(EthCoin::RinkebyEth),
        _ => Err(Error::UnsupportedNetwork(chain_id)),
    }
}

/// Infer the Ethereum coin from a `m/44'/<coin>'/...` keypath.
///
/// `60'` is mainnet and `1'` is the testnet coin type. Ropsten and Rinkeby
/// share `1'`, so a testnet keypath always maps to Ropsten; the device then
/// labels Rinkeby requests as Ropsten. This is a known limitation.
pub fn coin_from_keypath(levels: &[u32]) -> Result<EthCoin> {
    match eth_coin_type(levels)? {
        ETH_MAINNET_COIN_TYPE => Ok(EthCoin::Eth),
        _ => Ok(EthCoin::RopstenEth),
    }
}

/// Infer the chain id from a `m/44'/<coin>'/...` keypath: 1 for mainnet,
/// 3 for testnets (see [`coin_from_keypath`] for the aliasing caveat).
pub fn chain_id_from_keypath(levels: &[u32]) -> Result<u64> {
    match eth_coin_type(levels)? {
        ETH_MAINNET_COIN_TYPE => Ok(1),
        _ => Ok(3),
    }
}

const ETH_MAINNET_COIN_TYPE: u32 = hardened(60);
const ETH_TESTNET_COIN_TYPE: u32 = hardened(1);

fn eth_coin_type(levels: &[u32]) -> Result<u32> {
    let invalid = || Error::InvalidKeypath(Keypath::from(levels).to_string());

    if levels.first() != Some(&hardened(44)) {
        return Err(invalid());
    }
    match levels.get(1) {
        Some(&coin_type @ (ETH_MAINNET_COIN_TYPE | ETH_TESTNET_COIN_TYPE)) => Ok(coin_type),
        _ => Err(invalid()),
    }
}
