//! Error types for pairchat key handling and encryption

use thiserror::Error;

/// Key generation and key token errors
#[derive(Debug, Error)]
pub enum KeyError {
    /// The entropy source could not produce a private scalar
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Token does not start with a known key tag
    #[error("unknown key tag in token: {0}")]
    UnknownTag(String),

    /// Token body is not valid hex
    #[error("malformed hex in key token: {0}")]
    MalformedHex(#[from] hex::FromHexError),

    /// Decoded bytes do not form a key
    #[error("malformed key: expected {expected} bytes, got {got}")]
    MalformedKey { expected: usize, got: usize },
}

/// Sealed-box encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    #[error("key derivation failed")]
    KeyDerivationFailed,

    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// Wrong key, truncated or tampered ciphertext
    #[error("AEAD decryption failed")]
    DecryptionFailed,
}
