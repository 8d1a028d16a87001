//! Drives one owner's reconciliation session against one transport: opens
//! the connection, runs the `Initiate` handshake, exchanges frames through
//! the reconciler until the round converges, and applies backoff on failure.

use std::sync::Arc;

use evolu_crypto::OwnerId;
use evolu_protocol::{decode_frame, encode_frame, Frame};
use evolu_storage::{StorageDriver, StorageEngine};
use evolu_transport::{Transport, TransportEvent};

use crate::backoff::delay_for_attempt;
use crate::error::{Result, SyncError};
use crate::reconciler::ClientReconciler;
use crate::state::{transition, SyncEvent, SyncState};

/// How many consecutive failures a session tolerates before giving up and
/// returning an error to the caller, rather than retrying forever.
pub const MAX_ATTEMPTS: u32 = 8;

/// Runs reconciliation rounds for one `(owner, transport)` pair until the
/// caller cancels it or the attempt budget is exhausted.
pub struct SyncSession<D: StorageDriver, T: Transport> {
    reconciler: ClientReconciler<D>,
    transport: Arc<T>,
}

impl<D: StorageDriver, T: Transport> SyncSession<D, T> {
    /// Wrap the storage engine and transport this session drives.
    pub fn new(engine: Arc<StorageEngine<D>>, transport: Arc<T>) -> Self {
        Self { reconciler: ClientReconciler::new(engine), transport }
    }

    /// Drive one unit of work: reconcile `owner_id` against `url`, retrying
    /// on transport/protocol failure with exponential backoff up to
    /// [`MAX_ATTEMPTS`] attempts. Returns once a round converges, once
    /// `cancel` resolves, or once the attempt budget is exhausted.
    ///
    /// The caller owns the decision of *when* to invoke this (on a local
    /// mutation, on transport availability, on a retry timer); this method
    /// only owns the state machine and backoff for one such invocation.
    pub async fn run(
        &self,
        url: &str,
        owner_id: OwnerId,
        write_key: [u8; 16],
        cancel: impl std::future::Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(cancel);
        let mut state = SyncState::Idle;
        let mut attempt = 0u32;

        loop {
            state = transition(&state, &SyncEvent::WorkAvailable, attempt, delay_for_attempt);

            let outcome = tokio::select! {
                _ = &mut cancel => {
                    let _ = self.transport.close().await;
                    return Ok(());
                }
                outcome = self.run_one_round(url, owner_id, write_key, &mut state) => outcome,
            };

            match outcome {
                Ok(()) => {
                    state = transition(&state, &SyncEvent::RoundConverged, attempt, delay_for_attempt);
                    return Ok(());
                }
                Err(err) => {
                    attempt += 1;
                    let event = match &err {
                        SyncError::Transport(_) => SyncEvent::TransportError,
                        _ => SyncEvent::ProtocolError,
                    };
                    state = transition(&state, &event, attempt, delay_for_attempt);
                    if attempt >= MAX_ATTEMPTS {
                        return Err(err);
                    }
                    let SyncState::Backoff { delay, .. } = &state else {
                        return Err(err);
                    };
                    tracing::warn!(attempt, ?delay, error = %err, "reconciliation attempt failed, backing off");
                    tokio::select! {
                        _ = &mut cancel => {
                            let _ = self.transport.close().await;
                            return Ok(());
                        }
                        _ = tokio::time::sleep(*delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, run the `Initiate` handshake, and exchange frames until the
    /// round converges. Advances `state` to `Reconciling` once the handshake
    /// completes, so a failure partway through backs off from the right phase.
    async fn run_one_round(
        &self,
        url: &str,
        owner_id: OwnerId,
        write_key: [u8; 16],
        state: &mut SyncState,
    ) -> Result<()> {
        self.transport.connect(url).await?;

        let initiate = self.reconciler.initiate(owner_id, write_key).await?;
        self.send(&initiate).await?;
        *state = transition(state, &SyncEvent::HandshakeComplete, 0, delay_for_attempt);

        loop {
            let event = self.transport.recv().await?;
            let bytes = match event {
                TransportEvent::Message(bytes) => bytes,
                TransportEvent::Closed => return Err(SyncError::UnexpectedFrame("transport closed mid-round".into())),
            };
            let (frame, _) = decode_frame(&bytes)?;
            if matches!(frame, Frame::Ack { .. }) {
                return Ok(());
            }
            let followups = self.reconciler.handle_frame(owner_id, frame).await?;
            if followups.is_empty() {
                return Ok(());
            }
            for reply in &followups {
                self.send(reply).await?;
            }
        }
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        self.transport.send(encode_frame(frame)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evolu_storage::MemoryDriver;
    use evolu_transport::TransportError;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    struct LoopbackTransport {
        outbound: mpsc::Sender<Vec<u8>>,
        inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn connect(&self, _url: &str) -> evolu_transport::Result<()> {
            Ok(())
        }

        async fn send(&self, bytes: Vec<u8>) -> evolu_transport::Result<()> {
            self.outbound.send(bytes).await.map_err(|_| TransportError::Closed)
        }

        async fn recv(&self) -> evolu_transport::Result<TransportEvent> {
            match self.inbound.lock().recv().await {
                Some(bytes) => Ok(TransportEvent::Message(bytes)),
                None => Ok(TransportEvent::Closed),
            }
        }

        async fn close(&self) -> evolu_transport::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn round_converges_immediately_when_relay_echoes_an_ack() {
        let material = evolu_crypto::derive_owner_material(&[11u8; 32]).unwrap();
        let engine = Arc::new(StorageEngine::new(Arc::new(MemoryDriver::new())));
        engine.init(material.owner_id, material.encryption_key, 300_000).await.unwrap();

        let (client_out, mut relay_in) = mpsc::channel(8);
        let (relay_out, client_in) = mpsc::channel(8);
        let transport =
            Arc::new(LoopbackTransport { outbound: client_out, inbound: Mutex::new(client_in) });

        let relay_task = tokio::spawn(async move {
            let bytes = relay_in.recv().await.unwrap();
            let (frame, _) = decode_frame(&bytes).unwrap();
            let owner_id = match frame {
                Frame::Initiate { owner_id, .. } => owner_id,
                other => panic!("expected Initiate, got {other:?}"),
            };
            let ack = Frame::Ack { owner_id, up_to: [0u8; 12] };
            relay_out.send(encode_frame(&ack)).await.unwrap();
        });

        let session = SyncSession::new(engine, transport);
        let cancel = async { tokio::time::sleep(std::time::Duration::from_secs(5)).await };
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            session.run("memory://relay", material.owner_id, material.write_key, cancel),
        )
        .await;
        assert!(result.is_ok(), "session.run did not complete in time");
        result.unwrap().unwrap();
        relay_task.await.unwrap();
    }
}
