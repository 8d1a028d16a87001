//! Authenticated encryption and the timestamp-derived nonce policy.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::{CryptoError, Result};

/// Derive the 12-byte AEAD nonce deterministically from a message timestamp.
///
/// `first12(hash("evolu/nonce" ‖ timestamp_bytes))`. Uniqueness of the nonce
/// per owner follows from timestamp uniqueness, which the clock
/// (`evolu-clock`) already guarantees.
pub fn nonce_from_timestamp(timestamp_bytes: &[u8]) -> [u8; 12] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"evolu/nonce");
    hasher.update(timestamp_bytes);
    let hash = hasher.finalize();
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&hash.as_bytes()[..12]);
    nonce
}

/// Encrypt `plaintext` under `key` with `nonce`, authenticating `aad`.
pub fn encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Decrypt)
}

/// Decrypt `ciphertext` under `key` with `nonce`, verifying `aad`.
///
/// Returns [`CryptoError::Decrypt`] on authentication failure or a truncated
/// ciphertext; this is non-fatal to the surrounding message stream and the
/// caller is expected to drop just this message.
pub fn decrypt(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = [1u8; 32];
        let nonce = nonce_from_timestamp(b"some-timestamp-bytes");
        let ct = encrypt(&key, &nonce, b"hello world", b"owner-id").unwrap();
        let pt = decrypt(&key, &nonce, &ct, b"owner-id").unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [1u8; 32];
        let nonce = nonce_from_timestamp(b"ts");
        let mut ct = encrypt(&key, &nonce, b"hello world", b"aad").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(matches!(decrypt(&key, &nonce, &ct, b"aad"), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn wrong_aad_fails() {
        let key = [2u8; 32];
        let nonce = nonce_from_timestamp(b"ts");
        let ct = encrypt(&key, &nonce, b"payload", b"owner-a").unwrap();
        assert!(matches!(decrypt(&key, &nonce, &ct, b"owner-b"), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn nonce_differs_for_different_timestamps() {
        let a = nonce_from_timestamp(b"t1");
        let b = nonce_from_timestamp(b"t2");
        assert_ne!(a, b);
    }

    #[test]
    fn nonce_is_deterministic() {
        let a = nonce_from_timestamp(b"same");
        let b = nonce_from_timestamp(b"same");
        assert_eq!(a, b);
    }
}
