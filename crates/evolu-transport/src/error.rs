//! Errors surfaced by a transport connection.

/// Errors a [`crate::Transport`] implementation can raise.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connect attempt itself failed (DNS, TCP, TLS, or handshake).
    #[error("connect failed: {0}")]
    Connect(String),

    /// A send or receive failed on an already-open connection.
    #[error("io error: {0}")]
    Io(String),

    /// The peer closed the connection, or `close()` was called locally.
    #[error("transport closed")]
    Closed,

    /// An operation was attempted before `connect` succeeded.
    #[error("not connected")]
    NotConnected,
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
