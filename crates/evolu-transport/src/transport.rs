//! The byte-oriented duplex transport contract the sync engine drives.

use async_trait::async_trait;

use crate::error::Result;

/// Something delivered by a connected transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete message, in the order it was received.
    Message(Vec<u8>),
    /// The peer closed the connection; no more messages will arrive.
    Closed,
}

/// A reliable, ordered, byte-oriented duplex channel to one relay.
///
/// This models the collaborator API as a pull-based channel rather than
/// registered callbacks: `recv` blocks until the next message or close event,
/// which is the same shape `tokio-tungstenite`'s split stream already takes.
/// An implementation spawns whatever background task is needed to turn
/// push-style I/O into this pull-based form.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection. Calling `connect` again on an already-open
    /// transport is a no-op.
    async fn connect(&self, url: &str) -> Result<()>;

    /// Send one message. Fails with [`crate::TransportError::NotConnected`]
    /// if `connect` has not succeeded yet.
    async fn send(&self, bytes: Vec<u8>) -> Result<()>;

    /// Wait for the next event. Returns [`TransportEvent::Closed`] exactly
    /// once after the peer (or a local `close()`) ends the session, and
    /// every call after that returns [`crate::TransportError::Closed`].
    async fn recv(&self) -> Result<TransportEvent>;

    /// Close the connection from this side.
    async fn close(&self) -> Result<()>;
}
