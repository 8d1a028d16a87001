//! [`Transport`] over a WebSocket, used as a reliable byte-oriented duplex
//! channel to a relay.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Result, TransportError};
use crate::transport::{Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

enum State {
    Idle,
    Connected { sink: futures_util::stream::SplitSink<WsStream, WsMessage>, events: mpsc::Receiver<TransportEvent>, reader: JoinHandle<()> },
    Closed,
}

/// A [`Transport`] backed by `tokio-tungstenite`. Each instance owns exactly
/// one connection; `connect` after `close` reopens a fresh one.
pub struct WebSocketTransport {
    state: Mutex<State>,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketTransport {
    /// An idle transport, not yet connected.
    pub fn new() -> Self {
        Self { state: Mutex::new(State::Idle) }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Connected { .. }) {
            return Ok(());
        }

        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, mut stream) = ws_stream.split();
        let (tx, events) = mpsc::channel(64);

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(WsMessage::Binary(bytes)) => TransportEvent::Message(bytes),
                    Ok(WsMessage::Text(text)) => TransportEvent::Message(text.into_bytes()),
                    Ok(WsMessage::Close(_)) => {
                        let _ = tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::warn!(error = %err, "websocket read error, closing");
                        let _ = tx.send(TransportEvent::Closed).await;
                        break;
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        *state = State::Connected { sink, events, reader };
        Ok(())
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().await;
        match &mut *state {
            State::Connected { sink, .. } => {
                sink.send(WsMessage::Binary(bytes)).await.map_err(|e| TransportError::Io(e.to_string()))
            }
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&self) -> Result<TransportEvent> {
        let mut state = self.state.lock().await;
        match &mut *state {
            State::Connected { events, .. } => events.recv().await.ok_or(TransportError::Closed),
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let State::Connected { mut sink, reader, .. } = std::mem::replace(&mut *state, State::Closed) {
            let _ = sink.close().await;
            reader.abort();
        }
        Ok(())
    }
}
