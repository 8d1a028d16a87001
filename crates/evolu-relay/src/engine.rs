//! The relay-side engine: write-key admission, quota-checked message
//! ingestion, and the fingerprint index each owner's session reconciles
//! against. The client always dictates bucket boundaries for a round; this
//! engine mirrors them via `find_lower_bound` rather than computing its own
//! independent bucket count, so both sides compare identical spans even when
//! their index sizes differ.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use evolu_clock::Timestamp;
use evolu_fingerprint::FingerprintIndex;
use evolu_protocol::{EncryptedCrdtMessage, FingerprintRange};

use crate::driver::{RelayDriver, RelayStatement, WriteKey};
use crate::error::{RelayError, Result};
use crate::quota::{is_owner_within_quota, DEFAULT_QUOTA_BYTES};

struct OwnerState {
    index: FingerprintIndex,
}

/// Per-owner relay storage and reconciliation state.
pub struct RelayEngine<D: RelayDriver> {
    driver: Arc<D>,
    owners: SyncMutex<HashMap<[u8; 16], Arc<AsyncMutex<OwnerState>>>>,
    quota_bytes: u64,
}

impl<D: RelayDriver> RelayEngine<D> {
    /// Wrap `driver`, enforcing `quota_bytes` per owner.
    pub fn new(driver: Arc<D>, quota_bytes: u64) -> Self {
        Self { driver, owners: SyncMutex::new(HashMap::new()), quota_bytes }
    }

    /// Wrap `driver` with the default quota.
    pub fn with_default_quota(driver: Arc<D>) -> Self {
        Self::new(driver, DEFAULT_QUOTA_BYTES)
    }

    async fn owner_handle(&self, owner_id: [u8; 16]) -> Result<Arc<AsyncMutex<OwnerState>>> {
        if let Some(handle) = self.owners.lock().get(&owner_id).cloned() {
            return Ok(handle);
        }
        let timestamps = self.driver.timestamps(owner_id).await?;
        let mut index = FingerprintIndex::new();
        for ts in timestamps {
            index.insert(ts.to_binary12());
        }
        let handle = self
            .owners
            .lock()
            .entry(owner_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(OwnerState { index })))
            .clone();
        Ok(handle)
    }

    /// Admit (or reject) an `Initiate` for `owner_id` presenting `write_key`.
    /// A never-seen owner is admitted and its key persisted; a known owner
    /// must present the exact key already on file.
    pub async fn admit(&self, owner_id: [u8; 16], write_key: WriteKey) -> Result<()> {
        match self.driver.read_write_key(owner_id).await? {
            Some(on_file) if on_file == write_key => Ok(()),
            Some(_) => Err(RelayError::AuthMismatch),
            None => {
                self.driver
                    .transaction(vec![RelayStatement::SetWriteKey { owner_id, write_key }])
                    .await?;
                Ok(())
            }
        }
    }

    /// The top-level balanced-bucket fingerprints over the owner's whole index.
    pub async fn top_level_ranges(&self, owner_id: [u8; 16]) -> Result<Vec<FingerprintRange>> {
        self.ranges_in_span(owner_id, None, None).await
    }

    /// Mirror a peer's exact boundary list: fingerprint each
    /// `[previous boundary, boundary)` slice of this owner's own index,
    /// rather than computing an independent bucket count for the span.
    pub async fn ranges_at_boundaries(
        &self,
        owner_id: [u8; 16],
        lower: Option<[u8; 12]>,
        boundaries: &[Option<[u8; 12]>],
    ) -> Result<Vec<FingerprintRange>> {
        let handle = self.owner_handle(owner_id).await?;
        let owner = handle.lock().await;
        let size = owner.index.size();
        let mut cursor = match lower {
            Some(bound) => owner.index.find_lower_bound(0, size, Some(&bound)),
            None => 0,
        };
        let mut out = Vec::with_capacity(boundaries.len());
        for bound in boundaries {
            let next = owner.index.find_lower_bound(0, size, bound.as_ref());
            out.push(FingerprintRange { upper_bound: *bound, fingerprint: owner.index.fingerprint(cursor, next).0 });
            cursor = next;
        }
        Ok(out)
    }

    async fn ranges_in_span(
        &self,
        owner_id: [u8; 16],
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<Vec<FingerprintRange>> {
        let handle = self.owner_handle(owner_id).await?;
        let owner = handle.lock().await;
        let size = owner.index.size();
        let lo = match lower {
            Some(bound) => owner.index.find_lower_bound(0, size, Some(&bound)),
            None => 0,
        };
        let hi = owner.index.find_lower_bound(0, size, upper.as_ref());
        let buckets = evolu_fingerprint::compute_balanced_buckets(lo, hi);
        Ok(buckets
            .iter()
            .map(|bucket| {
                let bound = if bucket.hi == hi { upper } else { owner.index.get(bucket.hi).copied() };
                FingerprintRange { upper_bound: bound, fingerprint: owner.index.fingerprint(bucket.lo, bucket.hi).0 }
            })
            .collect())
    }

    /// Every encrypted message for `owner_id` whose 12-byte timestamp falls
    /// in `[lower, upper)`, in ascending timestamp order.
    pub async fn messages_in_range(
        &self,
        owner_id: [u8; 16],
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<Vec<EncryptedCrdtMessage>> {
        let rows = self
            .driver
            .messages_in_range(owner_id, lower.map(binary_to_timestamp), upper.map(binary_to_timestamp))
            .await?;
        Ok(rows.into_iter().map(|(timestamp, ciphertext)| EncryptedCrdtMessage { timestamp, ciphertext }).collect())
    }

    /// Ingest a batch of already-encrypted messages, rejecting the whole
    /// batch if it would push the owner over quota. Duplicate timestamps are
    /// idempotent no-ops and never count against usage twice.
    pub async fn ingest_messages(&self, owner_id: [u8; 16], messages: Vec<EncryptedCrdtMessage>) -> Result<usize> {
        let handle = self.owner_handle(owner_id).await?;
        let mut owner = handle.lock().await;

        let additional_bytes: u64 = messages.iter().map(|m| m.ciphertext.len() as u64).sum();
        let stored = self.driver.read_usage(owner_id).await?;
        if !is_owner_within_quota(stored, additional_bytes, self.quota_bytes) {
            return Err(RelayError::QuotaExceeded);
        }

        let mut statements = Vec::with_capacity(messages.len() + 1);
        let mut timestamps = Vec::with_capacity(messages.len());
        for msg in &messages {
            statements.push(RelayStatement::InsertMessage {
                owner_id,
                timestamp: msg.timestamp,
                ciphertext: msg.ciphertext.clone(),
            });
            timestamps.push(msg.timestamp);
        }

        let exec = self.driver.transaction(statements).await?;
        let mut applied = 0;
        let mut written_bytes = 0u64;
        for ((timestamp, msg), inserted) in timestamps.into_iter().zip(&messages).zip(exec.inserted.iter()) {
            if *inserted {
                owner.index.insert(timestamp.to_binary12());
                written_bytes += msg.ciphertext.len() as u64;
                applied += 1;
            }
        }
        if written_bytes > 0 {
            self.driver
                .transaction(vec![RelayStatement::IncrementUsage { owner_id, delta_bytes: written_bytes }])
                .await?;
        }
        Ok(applied)
    }

    /// The highest timestamp in the owner's index, for acknowledging a
    /// completed `Messages` exchange. `[0u8; 12]` for an empty index.
    pub async fn top_bound(&self, owner_id: [u8; 16]) -> Result<[u8; 12]> {
        let handle = self.owner_handle(owner_id).await?;
        let owner = handle.lock().await;
        let size = owner.index.size();
        Ok(if size == 0 { [0u8; 12] } else { *owner.index.get(size - 1).unwrap() })
    }

    /// Remove every table row belonging to `owner_id`: write key, messages,
    /// timestamps, and usage, atomically.
    pub async fn delete_owner(&self, owner_id: [u8; 16]) -> Result<()> {
        self.driver.transaction(vec![RelayStatement::DeleteOwner { owner_id }]).await?;
        self.owners.lock().remove(&owner_id);
        Ok(())
    }
}

fn binary_to_timestamp(bound: [u8; 12]) -> Timestamp {
    let (millis, counter, node_prefix) = Timestamp::from_binary12(&bound);
    let mut node = [0u8; 16];
    node[..4].copy_from_slice(&node_prefix);
    Timestamp::new(millis, counter, node).unwrap_or_else(|_| Timestamp::epoch(node))
}
