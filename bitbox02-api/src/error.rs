//! Error types for bitbox02-api

use crate::types::Status;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid keypath: {0}")]
    InvalidKeypath(String),

    #[error("Unsupported network: chain id {0}")]
    UnsupportedNetwork(i64),

    #[error("Could not establish a connection to the BitBox02: {0}")]
    ConnectionError(String),

    #[error("Pairing rejected")]
    PairingRejected,

    #[error("Firmware upgrade required")]
    FirmwareUpgradeRequired,

    #[error("Unsupported firmware, app upgrade required")]
    AppUpgradeRequired,

    #[error("Uninitialized")]
    UninitializedDevice,

    #[error("Unexpected status: {0}")]
    UnexpectedStatus(Status),

    #[error("Device or websocket not connected")]
    NotConnected,

    #[error("User abort")]
    UserAbort,

    #[error("{0}")]
    DeviceError(String),

    #[error("Invalid account name: {0}")]
    InvalidAccountName(String),

    #[cfg(feature = "bridge")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns true if the error is the device reporting that the user aborted
/// the operation on the device screen.
pub fn is_error_abort(err: &Error) -> bool {
    matches!(err, Error::UserAbort)
}
