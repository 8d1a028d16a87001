//! The client storage engine: owns the per-owner clock, fingerprint index,
//! and history/projection consistency, routing every write through the
//! driver as one atomic transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use evolu_clock::Clock;
use evolu_crypto::{decrypt, nonce_from_timestamp, random_bytes, EncryptionKey, OwnerId, OwnerKeyMaterial};
use evolu_fingerprint::FingerprintIndex;
use evolu_protocol::{deserialize_message, DbChange, EncryptedCrdtMessage, Value};

use crate::driver::{Statement, StorageDriver};
use crate::error::{Result, StorageError};
use crate::schema::{is_local_only, is_reserved};

struct OwnerState {
    clock: Clock,
    encryption_key: EncryptionKey,
    index: FingerprintIndex,
}

/// Per-owner client storage. All mutation and message-receipt paths acquire
/// the target owner's async mutex for their whole duration, matching the
/// "at most one writer per owner" concurrency rule; different owners proceed
/// independently.
pub struct StorageEngine<D: StorageDriver> {
    driver: Arc<D>,
    owners: SyncMutex<HashMap<OwnerId, Arc<AsyncMutex<OwnerState>>>>,
}

impl<D: StorageDriver> StorageEngine<D> {
    /// Wrap `driver` with no owners registered yet.
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver, owners: SyncMutex::new(HashMap::new()) }
    }

    /// Idempotently register an owner, restoring its clock and fingerprint
    /// index from the driver if a prior session persisted them.
    pub async fn init(&self, owner_id: OwnerId, encryption_key: EncryptionKey, max_drift_ms: u64) -> Result<()> {
        if self.owners.lock().contains_key(&owner_id) {
            return Ok(());
        }
        let restored_clock = self.driver.read_clock(owner_id).await?;
        let history = self.driver.history_rows(owner_id).await?;

        let node = {
            let bytes = random_bytes(16);
            let mut node = [0u8; 16];
            node.copy_from_slice(&bytes);
            node
        };
        let clock = match restored_clock {
            Some(current) => Clock::restore(current, max_drift_ms),
            None => Clock::new(node).with_max_drift(max_drift_ms),
        };
        let mut index = FingerprintIndex::new();
        for (_, _, _, timestamp, _) in history {
            index.insert(timestamp.to_binary12());
        }

        self.owners
            .lock()
            .entry(owner_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(OwnerState { clock, encryption_key, index })));
        Ok(())
    }

    fn owner_handle(&self, owner_id: OwnerId) -> Result<Arc<AsyncMutex<OwnerState>>> {
        self.owners.lock().get(&owner_id).cloned().ok_or(StorageError::UnknownOwner)
    }

    /// Apply a batch of local `DbChange`s inside one transaction: local-only
    /// tables are upserted directly; synced tables fan out to one stamped
    /// history row (plus projection upsert) per written column, plus the
    /// `createdAt`/`updatedAt`/`isDeleted` system columns.
    pub async fn apply_mutation(&self, owner_id: OwnerId, changes: Vec<DbChange>) -> Result<()> {
        let handle = self.owner_handle(owner_id)?;
        let mut owner = handle.lock().await;
        let now_ms = wall_clock_millis();

        let mut statements = Vec::new();
        let mut history_timestamps = Vec::new();

        for change in changes {
            if is_local_only(&change.table) {
                if change.is_delete {
                    statements.push(Statement::DeleteLocal { table: change.table, id: change.id });
                } else {
                    statements.push(Statement::UpsertLocal {
                        table: change.table,
                        id: change.id,
                        values: change.values,
                        updated_at_millis: now_ms,
                    });
                }
                continue;
            }

            for (column, value) in change.values {
                if is_reserved(&column) {
                    return Err(StorageError::Validation(format!("column {column} is reserved")));
                }
                let timestamp = owner.clock.send(now_ms)?;
                push_pair(&mut statements, owner_id, &change.table, &change.id, &column, timestamp, value);
                history_timestamps.push(timestamp);
            }

            if change.is_insert {
                let timestamp = owner.clock.send(now_ms)?;
                push_pair(
                    &mut statements,
                    owner_id,
                    &change.table,
                    &change.id,
                    "createdAt",
                    timestamp,
                    Value::Integer(now_ms as i64),
                );
                history_timestamps.push(timestamp);
            }

            let timestamp = owner.clock.send(now_ms)?;
            push_pair(
                &mut statements,
                owner_id,
                &change.table,
                &change.id,
                "updatedAt",
                timestamp,
                Value::Integer(now_ms as i64),
            );
            history_timestamps.push(timestamp);

            if change.is_delete {
                let timestamp = owner.clock.send(now_ms)?;
                push_pair(
                    &mut statements,
                    owner_id,
                    &change.table,
                    &change.id,
                    "isDeleted",
                    timestamp,
                    Value::Integer(1),
                );
                history_timestamps.push(timestamp);
            }
        }

        statements.push(Statement::PersistClock { owner_id, timestamp: owner.clock.current() });

        let exec = self.driver.transaction(statements).await?;
        for (timestamp, inserted) in history_timestamps.into_iter().zip(exec.inserted.iter()) {
            if *inserted {
                owner.index.insert(timestamp.to_binary12());
            }
        }
        Ok(())
    }

    /// Decrypt and apply a batch of received messages for `owner_id`.
    /// Returns the number of messages newly applied (duplicates are
    /// idempotent no-ops). Undecryptable or malformed messages are dropped
    /// and logged rather than failing the whole batch.
    pub async fn receive_messages(&self, owner_id: OwnerId, encrypted: Vec<EncryptedCrdtMessage>) -> Result<usize> {
        let handle = self.owner_handle(owner_id)?;
        let mut owner = handle.lock().await;
        let now_ms = wall_clock_millis();

        let mut statements = Vec::new();
        let mut timestamps = Vec::new();

        for msg in encrypted {
            let nonce = nonce_from_timestamp(&msg.timestamp.to_binary12());
            let plaintext = match decrypt(&owner.encryption_key, &nonce, &msg.ciphertext, &owner_id) {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!(owner = %hex::encode(owner_id), "dropping undecryptable message");
                    continue;
                }
            };
            let crdt_message = match deserialize_message(&plaintext) {
                Ok(m) => m,
                Err(_) => {
                    tracing::warn!(owner = %hex::encode(owner_id), "dropping malformed message");
                    continue;
                }
            };

            // Advances the local clock past the remote timestamp; the row
            // itself is stored under its own original timestamp so every
            // replica keyed on it converges to the same history.
            owner.clock.receive(msg.timestamp, now_ms)?;

            push_pair(
                &mut statements,
                owner_id,
                &crdt_message.table,
                &crdt_message.id,
                &crdt_message.column,
                msg.timestamp,
                crdt_message.value,
            );
            timestamps.push(msg.timestamp);
        }

        statements.push(Statement::PersistClock { owner_id, timestamp: owner.clock.current() });

        let exec = self.driver.transaction(statements).await?;
        let mut applied = 0;
        for (timestamp, inserted) in timestamps.into_iter().zip(exec.inserted.iter()) {
            if *inserted {
                owner.index.insert(timestamp.to_binary12());
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// A self-contained byte image of the underlying store.
    pub async fn export_database(&self) -> Result<Vec<u8>> {
        self.driver.export().await
    }

    /// Drop every table for `owner_id` and, if `restore_as` is given,
    /// re-initialize with that owner's material; otherwise the owner is left
    /// unregistered until a fresh [`Self::init`] call.
    pub async fn reset_or_restore(
        &self,
        owner_id: OwnerId,
        restore_as: Option<OwnerKeyMaterial>,
        max_drift_ms: u64,
    ) -> Result<()> {
        self.driver.transaction(vec![Statement::DropOwner { owner_id }]).await?;
        self.owners.lock().remove(&owner_id);
        if let Some(material) = restore_as {
            self.init(material.owner_id, material.encryption_key, max_drift_ms).await?;
        }
        Ok(())
    }

    /// Current size of the owner's fingerprint index (number of applied timestamps).
    pub async fn fingerprint_size(&self, owner_id: OwnerId) -> Result<usize> {
        let handle = self.owner_handle(owner_id)?;
        Ok(handle.lock().await.index.size())
    }

    /// The owner's most recently emitted or observed timestamp.
    pub async fn clock_snapshot(&self, owner_id: OwnerId) -> Result<evolu_clock::Timestamp> {
        let handle = self.owner_handle(owner_id)?;
        Ok(handle.lock().await.clock.current())
    }

    /// Resolve a `[lower, upper)` byte-bound span to `[lo, hi)` index
    /// positions and the XOR fingerprint covering them. `None` for either
    /// bound means "from the very start" / "the `+∞` sentinel".
    pub async fn span_fingerprint(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<(usize, usize, evolu_fingerprint::Fingerprint)> {
        let handle = self.owner_handle(owner_id)?;
        let owner = handle.lock().await;
        let size = owner.index.size();
        let lo = match lower {
            Some(bound) => owner.index.find_lower_bound(0, size, Some(&bound)),
            None => 0,
        };
        let hi = owner.index.find_lower_bound(0, size, upper.as_ref());
        Ok((lo, hi, owner.index.fingerprint(lo, hi)))
    }

    /// The balanced sub-buckets of `[lower, upper)`, each tagged with its own
    /// fingerprint and the byte-level upper bound a peer can realign against.
    pub async fn span_buckets(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<Vec<(Option<[u8; 12]>, evolu_fingerprint::Fingerprint)>> {
        let handle = self.owner_handle(owner_id)?;
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
                (bound, owner.index.fingerprint(bucket.lo, bucket.hi))
            })
            .collect())
    }

    /// Fingerprint the exact boundaries a peer already chose, so both sides
    /// compare over an identical set of upper bounds regardless of how their
    /// underlying index sizes differ within the span.
    pub async fn fingerprint_at_boundaries(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        boundaries: &[Option<[u8; 12]>],
    ) -> Result<Vec<evolu_fingerprint::Fingerprint>> {
        let handle = self.owner_handle(owner_id)?;
        let owner = handle.lock().await;
        let size = owner.index.size();
        let mut cursor = match lower {
            Some(bound) => owner.index.find_lower_bound(0, size, Some(&bound)),
            None => 0,
        };
        let mut out = Vec::with_capacity(boundaries.len());
        for bound in boundaries {
            let next = owner.index.find_lower_bound(0, size, bound.as_ref());
            out.push(owner.index.fingerprint(cursor, next));
            cursor = next;
        }
        Ok(out)
    }

    /// Every encrypted message in `[lower, upper)`, in timestamp order, ready
    /// to stream inside a `Messages` frame.
    pub async fn encrypted_messages_in_range(
        &self,
        owner_id: OwnerId,
        lower: Option<[u8; 12]>,
        upper: Option<[u8; 12]>,
    ) -> Result<Vec<evolu_protocol::EncryptedCrdtMessage>> {
        let handle = self.owner_handle(owner_id)?;
        let owner = handle.lock().await;
        let mut rows = self.driver.history_rows(owner_id).await?;
        rows.sort_by_key(|(_, _, _, timestamp, _)| *timestamp);

        let mut out = Vec::new();
        for (table, id, column, timestamp, value) in rows {
            let binary = timestamp.to_binary12();
            if let Some(bound) = lower {
                if binary < bound {
                    continue;
                }
            }
            if let Some(bound) = upper {
                if binary >= bound {
                    continue;
                }
            }
            let message = evolu_protocol::CrdtMessage { timestamp, table, id, column, value };
            let plaintext = evolu_protocol::serialize_message(&message)
                .map_err(|e| StorageError::Validation(e.to_string()))?;
            let nonce = nonce_from_timestamp(&binary);
            let ciphertext = evolu_crypto::encrypt(&owner.encryption_key, &nonce, &plaintext, &owner_id)?;
            out.push(evolu_protocol::EncryptedCrdtMessage { timestamp, ciphertext });
        }
        Ok(out)
    }
}

fn push_pair(
    statements: &mut Vec<Statement>,
    owner_id: OwnerId,
    table: &str,
    id: &[u8],
    column: &str,
    timestamp: evolu_clock::Timestamp,
    value: Value,
) {
    statements.push(Statement::InsertHistory {
        owner_id,
        table: table.to_string(),
        id: id.to_vec(),
        column: column.to_string(),
        timestamp,
        value: value.clone(),
    });
    statements.push(Statement::UpsertProjection {
        owner_id,
        table: table.to_string(),
        id: id.to_vec(),
        column: column.to_string(),
        timestamp,
        value,
    });
}

fn wall_clock_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
