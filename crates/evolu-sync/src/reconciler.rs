//! Turns incoming frames into fingerprint comparisons and the frames that
//! answer them. The client side always dictates the bucket boundaries for a
//! round (in `Initiate` or a narrowed `RangeFingerprints`); the relay mirrors
//! them by realigning its own index via `find_lower_bound`. This sidesteps
//! the "whichever side has more entries wins" tie-break for an equivalent,
//! simpler rule: the requester's boundaries are always authoritative.

use std::sync::Arc;

use futures::future::BoxFuture;

use evolu_crypto::OwnerId;
use evolu_protocol::{
    is_leaf_range, mismatched_ranges, ErrorKind, Frame, FingerprintRange, MismatchedRange, NeedRange,
};
use evolu_storage::{StorageDriver, StorageEngine};

use crate::error::{Result, SyncError};

/// Drives one owner's reconciliation against a [`StorageEngine`], reacting to
/// whatever frame the relay just sent.
pub struct ClientReconciler<D: StorageDriver> {
    engine: Arc<StorageEngine<D>>,
}

impl<D: StorageDriver> ClientReconciler<D> {
    /// Wrap the storage engine this reconciler reads and writes through.
    pub fn new(engine: Arc<StorageEngine<D>>) -> Self {
        Self { engine }
    }

    /// Build the `Initiate` frame opening a session for `owner_id`: the
    /// top-level balanced-bucket fingerprints over the owner's whole index.
    pub async fn initiate(&self, owner_id: OwnerId, write_key: [u8; 16]) -> Result<Frame> {
        let ranges = self.local_ranges(owner_id, None, None).await?;
        Ok(Frame::Initiate { owner_id, write_key, client_fingerprint_ranges: ranges })
    }

    /// React to one frame from the relay, producing zero or more frames to
    /// send back. An empty result after a `RangeFingerprints` reply means the
    /// round converged: nothing in this span mismatches.
    pub fn handle_frame(&self, owner_id: OwnerId, frame: Frame) -> BoxFuture<'_, Result<Vec<Frame>>> {
        Box::pin(async move {
            match frame {
                Frame::RangeFingerprints { lower, ranges, .. } => {
                    self.diff_against_peer(owner_id, lower, ranges).await
                }
                Frame::Messages { encrypted_messages, done, .. } => {
                    self.engine.receive_messages(owner_id, encrypted_messages).await?;
                    if done {
                        let up_to = self.engine.clock_snapshot(owner_id).await?.to_binary12();
                        Ok(vec![Frame::Ack { owner_id, up_to }])
                    } else {
                        Ok(Vec::new())
                    }
                }
                Frame::NeedMessages { ranges, .. } => {
                    let mut out = Vec::with_capacity(ranges.len());
                    for range in ranges {
                        let encrypted_messages =
                            self.engine.encrypted_messages_in_range(owner_id, Some(range.lower), range.upper).await?;
                        out.push(Frame::Messages { owner_id, encrypted_messages, done: true });
                    }
                    Ok(out)
                }
                Frame::Ack { .. } => Ok(Vec::new()),
                Frame::Error { kind, detail } => Err(SyncError::RemoteError { kind, detail }),
                Frame::Initiate { .. } => Err(SyncError::UnexpectedFrame("Initiate".to_string())),
            }
        })
    }

    async fn local_ranges(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<Vec<FingerprintRange>> {
        let buckets = self.engine.span_buckets(owner_id, lower, upper).await?;
        Ok(buckets
            .into_iter()
            .map(|(bound, fingerprint)| FingerprintRange { upper_bound: bound, fingerprint: fingerprint.0 })
            .collect())
    }

    async fn diff_against_peer(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        peer_ranges: Vec<FingerprintRange>,
    ) -> Result<Vec<Frame>> {
        let boundaries: Vec<Option<[u8; 12]>> = peer_ranges.iter().map(|r| r.upper_bound).collect();
        let local_fingerprints = self.engine.fingerprint_at_boundaries(owner_id, lower, &boundaries).await?;
        let local_ranges: Vec<FingerprintRange> = peer_ranges
            .iter()
            .zip(local_fingerprints)
            .map(|(peer, fp)| FingerprintRange { upper_bound: peer.upper_bound, fingerprint: fp.0 })
            .collect();

        let mut mismatches = mismatched_ranges(&local_ranges, &peer_ranges);
        // `mismatched_ranges` always starts tracking from `None`; patch the
        // first reported range back onto this span's real lower bound.
        if let Some(first) = mismatches.first_mut() {
            if first.lower.is_none() {
                first.lower = lower;
            }
        }

        let mut out = Vec::new();
        for mismatch in mismatches {
            out.extend(self.resolve_mismatch(owner_id, mismatch).await?);
        }
        Ok(out)
    }

    async fn resolve_mismatch(&self, owner_id: OwnerId, mismatch: MismatchedRange) -> Result<Vec<Frame>> {
        let (lo, hi, _) = self.engine.span_fingerprint(owner_id, mismatch.lower, mismatch.upper).await?;
        if is_leaf_range(hi - lo) {
            let need = NeedRange { lower: mismatch.lower.unwrap_or([0u8; 12]), upper: mismatch.upper };
            let encrypted_messages =
                self.engine.encrypted_messages_in_range(owner_id, mismatch.lower, mismatch.upper).await?;
            Ok(vec![
                Frame::NeedMessages { owner_id, ranges: vec![need] },
                Frame::Messages { owner_id, encrypted_messages, done: true },
            ])
        } else {
            let ranges = self.local_ranges(owner_id, mismatch.lower, mismatch.upper).await?;
            Ok(vec![Frame::RangeFingerprints { owner_id, lower: mismatch.lower, ranges }])
        }
    }
}

/// Build the `Error` frame sent when a relay or client abandons a session.
pub fn error_frame(kind: ErrorKind, detail: impl Into<String>) -> Frame {
    Frame::Error { kind, detail: detail.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolu_crypto::derive_owner_material;
    use evolu_storage::MemoryDriver;
    use std::collections::BTreeMap;

    async fn seeded_engine() -> (StorageEngine<MemoryDriver>, evolu_crypto::OwnerKeyMaterial) {
        let material = derive_owner_material(&[5u8; 32]).unwrap();
        let engine = StorageEngine::new(Arc::new(MemoryDriver::new()));
        engine.init(material.owner_id, material.encryption_key, 300_000).await.unwrap();
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), evolu_protocol::Value::Text("a".into()));
        engine
            .apply_mutation(
                material.owner_id,
                vec![evolu_protocol::DbChange {
                    table: "todo".into(),
                    id: b"r1".to_vec(),
                    values,
                    is_insert: true,
                    is_delete: false,
                }],
            )
            .await
            .unwrap();
        (engine, material)
    }

    #[tokio::test]
    async fn initiate_carries_top_level_ranges_matching_the_local_index() {
        let (engine, material) = seeded_engine().await;
        let reconciler = ClientReconciler::new(Arc::new(engine));
        let frame = reconciler.initiate(material.owner_id, material.write_key).await.unwrap();
        match frame {
            Frame::Initiate { client_fingerprint_ranges, .. } => assert!(!client_fingerprint_ranges.is_empty()),
            other => panic!("expected Initiate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identical_peer_ranges_produce_no_followup_frames() {
        let (engine, material) = seeded_engine().await;
        let engine = Arc::new(engine);
        let reconciler = ClientReconciler::new(engine.clone());
        let peer_ranges = reconciler.local_ranges(material.owner_id, None, None).await.unwrap();
        let followups = reconciler
            .handle_frame(
                material.owner_id,
                Frame::RangeFingerprints { owner_id: material.owner_id, lower: None, ranges: peer_ranges },
            )
            .await
            .unwrap();
        assert!(followups.is_empty());
    }

    #[tokio::test]
    async fn mismatched_leaf_range_requests_and_sends_messages() {
        let (engine, material) = seeded_engine().await;
        let engine = Arc::new(engine);
        let reconciler = ClientReconciler::new(engine.clone());
        let mut peer_ranges = reconciler.local_ranges(material.owner_id, None, None).await.unwrap();
        for range in &mut peer_ranges {
            range.fingerprint = [0xffu8; 12];
        }
        let followups = reconciler
            .handle_frame(
                material.owner_id,
                Frame::RangeFingerprints { owner_id: material.owner_id, lower: None, ranges: peer_ranges },
            )
            .await
            .unwrap();
        assert!(followups.iter().any(|f| matches!(f, Frame::NeedMessages { .. })));
        assert!(followups.iter().any(|f| matches!(f, Frame::Messages { .. })));
    }

    #[tokio::test]
    async fn error_frame_from_relay_is_surfaced() {
        let (engine, material) = seeded_engine().await;
        let reconciler = ClientReconciler::new(Arc::new(engine));
        let err = reconciler
            .handle_frame(material.owner_id, Frame::Error { kind: ErrorKind::Auth, detail: "bad key".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteError { kind: ErrorKind::Auth, .. }));
    }
}
