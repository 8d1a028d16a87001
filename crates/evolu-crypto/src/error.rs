//! Error types for cryptographic operations.

/// Errors produced by [`crate::encrypt`], [`crate::decrypt`], and key derivation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AEAD authentication failed or the ciphertext was truncated.
    ///
    /// Non-fatal to a message stream: the caller drops the offending
    /// message and continues.
    #[error("decryption failed: authentication tag mismatch or truncated ciphertext")]
    Decrypt,

    /// A mnemonic phrase failed BIP-39 checksum or word-list validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A requested key or nonce length is outside what the primitive supports.
    #[error("invalid length for {field}: {message}")]
    InvalidLength {
        /// Name of the parameter that failed validation.
        field: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
