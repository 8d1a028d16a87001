//! Cryptographic primitives for the Evolu sync core.
//!
//! Everything here is a pure function over byte slices: authenticated
//! encryption, SLIP-21-style owner key derivation, mnemonic handling, and a
//! CSPRNG wrapper. No network or storage I/O happens in this crate; it is the
//! innermost layer that `evolu-storage`, `evolu-sync`, and `evolu-relay`
//! build on.

pub mod aead;
pub mod error;
pub mod key_derivation;
pub mod mnemonic;

pub use aead::{decrypt, encrypt, nonce_from_timestamp};
pub use error::{CryptoError, Result};
pub use key_derivation::{derive_owner_material, EncryptionKey, OwnerId, OwnerKeyMaterial, WriteKey};
pub use mnemonic::{mnemonic_generate, mnemonic_to_seed, mnemonic_validate};

use rand::RngCore;

/// Fill and return `n` cryptographically random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Derive a full [`OwnerKeyMaterial`] triple from a BIP-39 mnemonic.
///
/// Same mnemonic yields the same triple on every device.
pub fn derive_from_mnemonic(phrase: &str) -> Result<OwnerKeyMaterial> {
    let seed = mnemonic::mnemonic_to_seed(phrase)?;
    key_derivation::derive_owner_material(&seed)
}
