//! Errors raised while driving a reconciliation session.

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The storage engine rejected a read or write.
    #[error(transparent)]
    Storage(#[from] evolu_storage::StorageError),

    /// The transport connection failed or dropped.
    #[error(transparent)]
    Transport(#[from] evolu_transport::TransportError),

    /// A frame failed to encode or decode.
    #[error(transparent)]
    Protocol(#[from] evolu_protocol::ProtocolError),

    /// The relay sent an `Error` frame ending the session.
    #[error("relay closed the session: {kind:?}: {detail}")]
    RemoteError { kind: evolu_protocol::ErrorKind, detail: String },

    /// A frame arrived that made no sense in the session's current phase.
    #[error("unexpected frame in current phase: {0}")]
    UnexpectedFrame(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
