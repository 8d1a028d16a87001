//! BIP-39 mnemonic generation, validation, and seed derivation.
//!
//! Delegates to the `bip39` crate for word-list handling and checksum
//! validation rather than re-deriving PBKDF2/word-list logic in-house.

use bip39::Mnemonic;

use crate::error::{CryptoError, Result};

/// Generate a fresh 12-word (128-bit entropy) BIP-39 mnemonic.
pub fn mnemonic_generate() -> String {
    let entropy = crate::random_bytes(16);
    let mnemonic = Mnemonic::from_entropy(&entropy).expect("16 bytes is a valid entropy length");
    mnemonic.to_string()
}

/// Validate a mnemonic's word list membership and checksum.
pub fn mnemonic_validate(phrase: &str) -> Result<()> {
    Mnemonic::parse(phrase)
        .map(|_| ())
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))
}

/// Derive a 64-byte seed from a mnemonic. No passphrase support: Evolu owners
/// never need a second factor layered on top of the phrase itself.
pub fn mnemonic_to_seed(phrase: &str) -> Result<[u8; 64]> {
    let mnemonic =
        Mnemonic::parse(phrase).map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_seed(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mnemonics_validate() {
        for _ in 0..20 {
            let phrase = mnemonic_generate();
            assert_eq!(phrase.split_whitespace().count(), 12);
            mnemonic_validate(&phrase).expect("generated mnemonic must validate");
        }
    }

    #[test]
    fn all_zero_entropy_matches_known_test_vector() {
        // The canonical BIP-39 test vector: 128 bits of zero entropy encodes
        // to eleven "abandon"s followed by "about" (the checksum word).
        let phrase = "abandon abandon abandon abandon abandon abandon abandon \
                       abandon abandon abandon abandon about";
        mnemonic_validate(phrase).expect("known test vector must validate");
    }

    #[test]
    fn wrong_checksum_word_is_rejected() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon \
                    abandon abandon abandon abandon abandon";
        assert!(mnemonic_validate(bad).is_err());
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(mnemonic_validate("abandon abandon abandon").is_err());
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let phrase = mnemonic_generate();
        let a = mnemonic_to_seed(&phrase).unwrap();
        let b = mnemonic_to_seed(&phrase).unwrap();
        assert_eq!(a, b);
    }
}
