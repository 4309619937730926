//! Sealed-box encryption of single chat payloads
//!
//! Each payload is sealed independently:
//! 1. Generate an ephemeral X25519 keypair
//! 2. ECDH with the recipient public key
//! 3. HKDF-SHA256 over the shared secret, bound to both public keys
//! 4. ChaCha20-Poly1305 with a random nonce
//!
//! Wire layout: `ephemeral_public (32) || nonce (12) || ciphertext + tag`.

use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey, KEY_LEN};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};

/// Domain label mixed into the HKDF info
const HKDF_LABEL: &[u8] = b"pairchat-sealed-box-v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Smallest valid sealed payload (empty plaintext)
pub const MIN_SEALED_LEN: usize = KEY_LEN + NONCE_LEN + TAG_LEN;

/// Seal `plaintext` so only the holder of `recipient`'s private key can open it
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient.inner());

    let cipher = derive_cipher(shared.as_bytes(), &ephemeral_public, recipient.inner())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(KEY_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a payload produced by [`encrypt`] with the local private key
pub fn decrypt(sealed: &[u8], private: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CryptoError::CiphertextTooShort(sealed.len()));
    }

    let mut ephemeral_bytes = [0u8; KEY_LEN];
    ephemeral_bytes.copy_from_slice(&sealed[..KEY_LEN]);
    let ephemeral_public = X25519Public::from(ephemeral_bytes);
    let nonce = Nonce::from_slice(&sealed[KEY_LEN..KEY_LEN + NONCE_LEN]);

    let shared = private.inner().diffie_hellman(&ephemeral_public);
    let our_public = X25519Public::from(private.inner());
    let cipher = derive_cipher(shared.as_bytes(), &ephemeral_public, &our_public)?;

    cipher
        .decrypt(nonce, &sealed[KEY_LEN + NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn derive_cipher(
    shared_secret: &[u8; 32],
    ephemeral_public: &X25519Public,
    recipient_public: &X25519Public,
) -> Result<ChaCha20Poly1305, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);

    let mut info = Vec::with_capacity(HKDF_LABEL.len() + 2 * KEY_LEN);
    info.extend_from_slice(HKDF_LABEL);
    info.extend_from_slice(ephemeral_public.as_bytes());
    info.extend_from_slice(recipient_public.as_bytes());

    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use rand::Rng;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let kp = KeyPair::generate().unwrap();
        let sealed = encrypt(b"hi", kp.public_key()).unwrap();

        assert_ne!(sealed.as_slice(), b"hi");
        assert_eq!(sealed.len(), MIN_SEALED_LEN + 2);
        assert_eq!(decrypt(&sealed, kp.private_key()).unwrap(), b"hi");
    }

    #[test]
    fn test_roundtrip_random_payloads() {
        let mut rng = rand::thread_rng();

        for _ in 0..32 {
            let kp = KeyPair::generate().unwrap();
            let len = rng.gen_range(0..4096);
            let mut message = vec![0u8; len];
            rng.fill(&mut message[..]);

            let sealed = encrypt(&message, kp.public_key()).unwrap();
            assert_eq!(decrypt(&sealed, kp.private_key()).unwrap(), message);
        }
    }

    #[test]
    fn test_same_plaintext_seals_differently() {
        let kp = KeyPair::generate().unwrap();
        let a = encrypt(b"same", kp.public_key()).unwrap();
        let b = encrypt(b"same", kp.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let recipient = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();

        let sealed = encrypt(b"secret", recipient.public_key()).unwrap();
        assert!(matches!(
            decrypt(&sealed, other.private_key()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let kp = KeyPair::generate().unwrap();
        let sealed = encrypt(b"do not touch", kp.public_key()).unwrap();

        for index in [0, KEY_LEN, KEY_LEN + NONCE_LEN, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert!(decrypt(&tampered, kp.private_key()).is_err());
        }
    }

    #[test]
    fn test_truncated_ciphertext() {
        let kp = KeyPair::generate().unwrap();
        assert!(matches!(
            decrypt(&[0u8; MIN_SEALED_LEN - 1], kp.private_key()),
            Err(CryptoError::CiphertextTooShort(_))
        ));
        assert!(matches!(
            decrypt(b"hello", kp.private_key()),
            Err(CryptoError::CiphertextTooShort(5))
        ));
    }
}
