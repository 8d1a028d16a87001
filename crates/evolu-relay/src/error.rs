//! Errors raised by the relay's storage driver and session handler.

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The underlying driver failed a statement.
    #[error("relay driver error: {0}")]
    Driver(String),

    /// `Initiate` presented a write key that didn't match the one on file.
    #[error("write key mismatch for this owner")]
    AuthMismatch,

    /// The owner has exceeded its storage quota.
    #[error("owner exceeded storage quota")]
    QuotaExceeded,

    /// A frame arrived that made no sense in the session's current phase.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error(transparent)]
    Protocol(#[from] evolu_protocol::ProtocolError),

    #[error(transparent)]
    Transport(#[from] evolu_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, RelayError>;
