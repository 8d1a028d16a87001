//! SLIP-21-style key derivation for owner material.
//!
//! A single 64-byte master seed (itself derived from a BIP-39 mnemonic via
//! PBKDF2-over-HMAC-SHA512 in [`crate::mnemonic`]) is expanded into the three
//! owner-scoped secrets a device needs: the owner id, the symmetric
//! encryption key, and the write key presented to a relay. Each secret is
//! derived under a distinct domain-separation label so that learning one
//! never helps an attacker learn another.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{CryptoError, Result};

/// 16-byte owner identifier.
pub type OwnerId = [u8; 16];
/// 32-byte symmetric AEAD key, never leaves the device.
pub type EncryptionKey = [u8; 32];
/// 16-byte proof-of-write token presented to a relay.
pub type WriteKey = [u8; 16];

/// The triple of owner-scoped secrets derived from a single master seed.
#[derive(Clone)]
pub struct OwnerKeyMaterial {
    /// The owner's identifier.
    pub owner_id: OwnerId,
    /// The owner's symmetric encryption key.
    pub encryption_key: EncryptionKey,
    /// The owner's write key.
    pub write_key: WriteKey,
}

impl std::fmt::Debug for OwnerKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerKeyMaterial")
            .field("owner_id", &hex::encode(self.owner_id))
            .field("encryption_key", &"<redacted>")
            .field("write_key", &"<redacted>")
            .finish()
    }
}

/// Derive the owner id, encryption key, and write key from a master seed.
///
/// Domain-separation labels follow the SLIP-21 convention of a `"/"`-joined
/// path under a root context string; every label is hashed through HKDF-SHA256
/// expansion of the seed so the three outputs are independent even though they
/// share one root.
pub fn derive_owner_material(seed: &[u8]) -> Result<OwnerKeyMaterial> {
    if seed.len() < 32 {
        return Err(CryptoError::InvalidLength {
            field: "seed",
            message: format!("expected at least 32 bytes, got {}", seed.len()),
        });
    }

    let owner_id = expand(seed, b"Evolu mnemonic seed/ownerId", 16)?;
    let encryption_key = expand(seed, b"Evolu mnemonic seed/encryptionKey", 32)?;
    let write_key = expand(seed, b"Evolu mnemonic seed/writeKey", 16)?;

    let mut material = OwnerKeyMaterial {
        owner_id: [0u8; 16],
        encryption_key: [0u8; 32],
        write_key: [0u8; 16],
    };
    material.owner_id.copy_from_slice(&owner_id);
    material.encryption_key.copy_from_slice(&encryption_key);
    material.write_key.copy_from_slice(&write_key);
    Ok(material)
}

fn expand(seed: &[u8], label: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(label), seed);
    let mut out = vec![0u8; len];
    hk.expand(b"", &mut out).map_err(|_| CryptoError::InvalidLength {
        field: "output_length",
        message: format!("HKDF expansion failed for {len} bytes"),
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let seed = [7u8; 32];
        let a = derive_owner_material(&seed).unwrap();
        let b = derive_owner_material(&seed).unwrap();
        assert_eq!(a.owner_id, b.owner_id);
        assert_eq!(a.encryption_key, b.encryption_key);
        assert_eq!(a.write_key, b.write_key);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = derive_owner_material(&[1u8; 32]).unwrap();
        let b = derive_owner_material(&[2u8; 32]).unwrap();
        assert_ne!(a.owner_id, b.owner_id);
        assert_ne!(a.encryption_key, b.encryption_key);
    }

    #[test]
    fn outputs_are_independent() {
        let m = derive_owner_material(&[9u8; 32]).unwrap();
        assert_ne!(&m.owner_id[..], &m.write_key[..]);
        assert_ne!(&m.encryption_key[..16], &m.write_key[..]);
    }

    #[test]
    fn rejects_short_seed() {
        assert!(derive_owner_material(&[0u8; 10]).is_err());
    }
}
