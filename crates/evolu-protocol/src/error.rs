//! Errors raised while decoding frames or payloads.

/// Errors produced by [`crate::wire`] and [`crate::message`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame's `protocolVersion` varint did not match [`crate::PROTOCOL_VERSION`].
    #[error("protocol version mismatch: peer sent {peer}, expected {expected}")]
    Version {
        /// Version the peer sent.
        peer: u64,
        /// Version this side supports.
        expected: u64,
    },

    /// A frame's bytes were malformed, truncated, or carried an unknown discriminant.
    #[error("frame decode error: {0}")]
    FrameDecode(String),

    /// A payload nested inside a frame failed to (de)serialize.
    #[error("payload codec error: {0}")]
    PayloadCodec(String),
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
