//! A byte-oriented duplex transport to one relay, and a WebSocket
//! implementation of it. The sync engine is generic over [`Transport`] so a
//! local-only deployment can run with zero transports configured.

pub mod error;
pub mod transport;
pub mod websocket;

pub use error::{Result, TransportError};
pub use transport::{Transport, TransportEvent};
pub use websocket::WebSocketTransport;
