//! Errors raised by the CLI binary itself, wrapping each library's own error.

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The configuration file was missing, unreadable, or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The storage engine rejected a read or write.
    #[error(transparent)]
    Storage(#[from] evolu_storage::StorageError),

    /// A reconciliation session failed.
    #[error(transparent)]
    Sync(#[from] evolu_sync::SyncError),

    /// Key derivation or mnemonic handling failed.
    #[error(transparent)]
    Crypto(#[from] evolu_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, CliError>;
