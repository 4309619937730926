//! X25519 key material and its tagged hex token encoding
//!
//! Keys travel inside the chat stream as ASCII tokens:
//! - `PUBK-<64 hex chars>` for a public key
//! - `PRIVK-<64 hex chars>` for a private key
//!
//! Private keys are encodable so they can be exported locally; the client
//! never puts one on the wire.

use crate::error::KeyError;
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// Key length in bytes for both halves of the pair
pub const KEY_LEN: usize = 32;

/// Tag prefix of a public key token
pub const PUBLIC_TAG: &str = "PUBK-";
/// Tag prefix of a private key token
pub const PRIVATE_TAG: &str = "PRIVK-";

/// Tagged hex token encoding shared by both key halves
pub trait KeyEncoding: Sized {
    /// Token prefix for this key kind
    const TAG: &'static str;

    /// Raw key bytes
    fn to_bytes(&self) -> [u8; KEY_LEN];

    /// Build from raw key bytes
    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self;

    /// Encode as `TAG + hex(bytes)`
    fn encode(&self) -> String {
        format!("{}{}", Self::TAG, hex::encode(self.to_bytes()))
    }

    /// Decode a token produced by [`KeyEncoding::encode`].
    ///
    /// Surrounding whitespace (the line terminator) is ignored.
    fn decode(token: &str) -> Result<Self, KeyError> {
        let token = token.trim();
        let body = token
            .strip_prefix(Self::TAG)
            .ok_or_else(|| KeyError::UnknownTag(truncate(token)))?;
        let raw = hex::decode(body)?;
        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::MalformedKey {
                expected: KEY_LEN,
                got: raw.len(),
            })?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Public half of a session keypair
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(X25519Public);

impl PublicKey {
    pub(crate) fn inner(&self) -> &X25519Public {
        &self.0
    }
}

impl KeyEncoding for PublicKey {
    const TAG: &'static str = PUBLIC_TAG;

    fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(X25519Public::from(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0.as_bytes()[..8]))
    }
}

/// Private half of a session keypair
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    pub(crate) fn inner(&self) -> &StaticSecret {
        &self.0
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519Public::from(&self.0))
    }
}

impl KeyEncoding for PrivateKey {
    const TAG: &'static str = PRIVATE_TAG;

    fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(StaticSecret::from(bytes))
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// A decoded key token of either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    Public(PublicKey),
    Private(PrivateKey),
}

impl KeyToken {
    /// Classify and decode a token by its tag
    pub fn parse(token: &str) -> Result<Self, KeyError> {
        let trimmed = token.trim();
        if trimmed.starts_with(PUBLIC_TAG) {
            PublicKey::decode(trimmed).map(Self::Public)
        } else if trimmed.starts_with(PRIVATE_TAG) {
            PrivateKey::decode(trimmed).map(Self::Private)
        } else {
            Err(KeyError::UnknownTag(truncate(trimmed)))
        }
    }

    /// Whether `text` carries a key tag (without validating the body)
    pub fn is_tagged(text: &str) -> bool {
        let text = text.trim_start();
        text.starts_with(PUBLIC_TAG) || text.starts_with(PRIVATE_TAG)
    }
}

/// Session keypair; the private half never leaves its owner
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS entropy source
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self::from_seed(seed))
    }

    /// Create from seed bytes (for deterministic testing)
    pub fn from_seed(seed: [u8; KEY_LEN]) -> Self {
        let private = PrivateKey::from_bytes(seed);
        let public = private.public_key();
        Self { private, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }
}

fn truncate(token: &str) -> String {
    token.chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_token_roundtrip() {
        let kp = KeyPair::generate().unwrap();
        let token = kp.public_key().encode();

        assert!(token.starts_with("PUBK-"));
        assert_eq!(token.len(), PUBLIC_TAG.len() + 2 * KEY_LEN);
        assert_eq!(PublicKey::decode(&token).unwrap(), *kp.public_key());
    }

    #[test]
    fn test_private_token_roundtrip() {
        let kp = KeyPair::generate().unwrap();
        let token = kp.private_key().encode();

        assert!(token.starts_with("PRIVK-"));
        let decoded = PrivateKey::decode(&token).unwrap();
        assert_eq!(decoded, *kp.private_key());
        assert_eq!(decoded.public_key(), *kp.public_key());
    }

    #[test]
    fn test_decode_ignores_line_terminator() {
        let kp = KeyPair::from_seed([7; KEY_LEN]);
        let token = format!("{}\n", kp.public_key().encode());

        assert_eq!(PublicKey::decode(&token).unwrap(), *kp.public_key());
    }

    #[test]
    fn test_decode_rejects_bad_hex() {
        let err = PublicKey::decode("PUBK-zz11").unwrap_err();
        assert!(matches!(err, KeyError::MalformedHex(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = PublicKey::decode("PUBK-00112233").unwrap_err();
        assert!(matches!(
            err,
            KeyError::MalformedKey {
                expected: KEY_LEN,
                got: 4
            }
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_tag() {
        let kp = KeyPair::from_seed([1; KEY_LEN]);
        let err = PublicKey::decode(&kp.private_key().encode()).unwrap_err();
        assert!(matches!(err, KeyError::UnknownTag(_)));
    }

    #[test]
    fn test_key_token_classification() {
        let kp = KeyPair::from_seed([3; KEY_LEN]);

        assert_eq!(
            KeyToken::parse(&kp.public_key().encode()).unwrap(),
            KeyToken::Public(*kp.public_key())
        );
        assert_eq!(
            KeyToken::parse(&kp.private_key().encode()).unwrap(),
            KeyToken::Private(kp.private_key().clone())
        );
        assert!(KeyToken::parse("hello").is_err());
        assert!(KeyToken::is_tagged("PUBK-abc"));
        assert!(!KeyToken::is_tagged("hello PUBK-"));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = KeyPair::from_seed([9; KEY_LEN]);
        let rendered = format!("{:?}", kp);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains(&hex::encode([9u8; KEY_LEN])));
    }
}
