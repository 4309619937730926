//! pairchat core library
//!
//! Key material and payload encryption for the two-party chat relay.
//!
//! # Modules
//!
//! - [`keys`]: X25519 keypairs and `PUBK-`/`PRIVK-` hex tokens
//! - [`cipher`]: Sealed-box encrypt/decrypt of single payloads
//! - [`error`]: Error types

pub mod cipher;
pub mod error;
pub mod keys;

pub use error::{CryptoError, KeyError};
pub use keys::{KeyEncoding, KeyPair, KeyToken, PrivateKey, PublicKey};
