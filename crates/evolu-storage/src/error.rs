//! Errors raised by the storage engine and its driver collaborator.

/// Errors produced by [`crate::engine::StorageEngine`] and [`crate::driver::StorageDriver`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The underlying driver (SQLite/OPFS/in-memory) failed a statement.
    #[error("storage driver error: {0}")]
    Driver(String),

    /// A mutation referenced a reserved column or malformed table name.
    #[error("validation error: {0}")]
    Validation(String),

    /// An owner was requested but is not known to this engine.
    #[error("unknown owner")]
    UnknownOwner,

    /// The clock rejected an operation while stamping a change.
    #[error(transparent)]
    Clock(#[from] evolu_clock::ClockError),

    /// Encryption or decryption of a message failed.
    #[error(transparent)]
    Crypto(#[from] evolu_crypto::CryptoError),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
