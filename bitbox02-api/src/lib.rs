//! Host-side client for the BitBox02 hardware wallet
//!
//! This crate pairs with a BitBox02 over the BitBoxBridge websocket or direct
//! USB HID, walks the user through pairing code verification, and exposes
//! typed Bitcoin, Ethereum and Cardano operations as async methods on a
//! [`Session`].
//!
//! The encrypted channel and firmware wire format are handled by a device
//! engine supplied by the caller through [`EngineFactory`]; this crate drives
//! it and turns its callbacks into futures.
//!
//! # Examples
//!
//! ```no_run
//! use bitbox02_api::{BridgeConfig, ConnectHandler, EngineFactory, Keypath};
//! use bitbox02_api::types::{BtcCoin, BtcXPubType};
//! use std::sync::Arc;
//!
//! struct Prompt;
//!
//! #[async_trait::async_trait]
//! impl ConnectHandler for Prompt {
//!     fn show_pairing(&self, code: &str) {
//!         println!("Pairing code:\n{code}");
//!     }
//!     async fn user_verify(&self) -> bool {
//!         true
//!     }
//!     fn attestation_result(&self, ok: bool) {
//!         println!("Attestation: {ok}");
//!     }
//! }
//!
//! # async fn example(factory: impl EngineFactory + 'static) -> bitbox02_api::Result<()> {
//! let path = bitbox02_api::get_device_path(false, &BridgeConfig::default()).await?;
//! let session = bitbox02_api::open(path, factory);
//! session.connect(Arc::new(Prompt)).await?;
//!
//! let keypath: Keypath = "m/84'/0'/0'".parse()?;
//! let xpub = session
//!     .btc_xpub(BtcCoin::Btc, &keypath, BtcXPubType::Zpub, false)
//!     .await?;
//! println!("zpub: {xpub}");
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod connection;
#[cfg(feature = "bridge")]
pub mod discovery;
pub mod engine;
mod error;
pub mod keypath;
pub mod messages;
mod ops;
pub mod session;
pub mod transport;
pub mod types;

pub use adapter::{CallError, EngineAdapter};
#[cfg(feature = "bridge")]
pub use discovery::{discover_bridge_device, get_device_path};
pub use engine::{
    Completion, DeviceEngine, EngineError, EngineErrorKind, EngineEvent, EngineFactory, Writer,
};
pub use error::{Error, Result, is_error_abort};
pub use keypath::{
    Keypath, chain_id_from_keypath, coin_from_chain_id, coin_from_keypath, hardened,
    parse_keypath,
};
pub use ops::{MAX_ACCOUNT_NAME_LEN, validate_account_name};
pub use session::{ConnectHandler, Session, SessionState, open};
pub use types::{BridgeConfig, DevicePath, HARDENED, Product, Status, TransportMode};
