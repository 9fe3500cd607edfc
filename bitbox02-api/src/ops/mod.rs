//! Typed device operations on a connected [`Session`](crate::Session)
//!
//! Each operation validates its arguments, fills in the defaults the engine
//! needs, and maps engine failures to [`Error::UserAbort`] or
//! [`Error::DeviceError`].

mod btc;
mod cardano;
mod eth;

use crate::error::{Error, Result};
use crate::messages::BtcSignature;
use crate::types::SIGNATURE_LEN;

/// Longest multisig account name the device accepts.
pub const MAX_ACCOUNT_NAME_LEN: usize = 30;

/// Check that a multisig account name is 1 to 30 printable ASCII characters.
pub fn validate_account_name(name: &str) -> Result<()> {
    let printable = name.bytes().all(|b| (0x20..=0x7e).contains(&b));
    if name.is_empty() || name.len() > MAX_ACCOUNT_NAME_LEN || !printable {
        return Err(Error::InvalidAccountName(name.to_string()));
    }
    Ok(())
}

/// Convert the engine's per-input signatures, requiring one 64 byte
/// signature per input.
fn input_signatures(raw: Vec<Vec<u8>>, inputs: usize) -> Result<Vec<BtcSignature>> {
    if raw.len() != inputs {
        return Err(Error::DeviceError(format!(
            "expected {inputs} signatures, got {}",
            raw.len()
        )));
    }
    raw.into_iter()
        .map(|sig| {
            <BtcSignature>::try_from(sig.as_slice()).map_err(|_| {
                Error::DeviceError(format!(
                    "expected {SIGNATURE_LEN} byte signature, got {} bytes",
                    sig.len()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_names() {
        assert!(validate_account_name("a").is_ok());
        assert!(validate_account_name("My multisig ~ 2-of-3").is_ok());
        assert!(validate_account_name(&"x".repeat(30)).is_ok());

        for bad in ["", "tab\there", "caf\u{e9}", "line\n"] {
            assert!(matches!(
                validate_account_name(bad),
                Err(Error::InvalidAccountName(_))
            ));
        }
        assert!(validate_account_name(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_input_signatures() -> Result<()> {
        let sigs = input_signatures(vec![vec![1; 64], vec![2; 64]], 2)?;
        assert_eq!(sigs, vec![[1u8; 64], [2u8; 64]]);

        assert!(matches!(
            input_signatures(vec![vec![1; 64]], 2),
            Err(Error::DeviceError(_))
        ));
        assert!(matches!(
            input_signatures(vec![vec![1; 63]], 1),
            Err(Error::DeviceError(_))
        ));
        Ok(())
    }
}
