//! The relay driver collaborator contract, plus an in-memory reference
//! implementation. Mirrors the persisted layout: a write key and byte usage
//! counter per owner, and a `(owner, timestamp) -> ciphertext` message table
//! that also backs the relay's own fingerprint index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use evolu_clock::Timestamp;

use crate::error::Result;

/// 16-byte write-key proof of access, as raw bytes.
pub type WriteKey = [u8; 16];

/// One durable statement, applied atomically inside [`RelayDriver::transaction`].
#[derive(Debug, Clone)]
pub enum RelayStatement {
    /// Record `write_key` for a previously-unseen owner. A no-op if the
    /// owner already has one on file (admission is checked beforehand).
    SetWriteKey {
        /// Owning user.
        owner_id: [u8; 16],
        /// The write key to remember.
        write_key: WriteKey,
    },
    /// Store one encrypted message, unless `(owner, timestamp)` already exists.
    InsertMessage {
        /// Owning user.
        owner_id: [u8; 16],
        /// The message's timestamp, doubling as its sort/primary key.
        timestamp: Timestamp,
        /// Encrypted payload.
        ciphertext: Vec<u8>,
    },
    /// Add `delta_bytes` to the owner's running storage usage.
    IncrementUsage {
        /// Owning user.
        owner_id: [u8; 16],
        /// Bytes to add.
        delta_bytes: u64,
    },
    /// Remove every table row belonging to an owner: write key, messages,
    /// timestamps, and usage.
    DeleteOwner {
        /// Owning user.
        owner_id: [u8; 16],
    },
}

/// Outcome of applying a batch of statements.
#[derive(Debug, Clone, Default)]
pub struct RelayExecResult {
    /// Per-`InsertMessage`-statement flag: `true` if newly inserted, `false`
    /// if the primary key already held that exact row (idempotent no-op).
    pub inserted: Vec<bool>,
}

/// The relay driver collaborator API the engine requires.
#[async_trait]
pub trait RelayDriver: Send + Sync {
    /// Apply `statements` as one all-or-nothing transaction.
    async fn transaction(&self, statements: Vec<RelayStatement>) -> Result<RelayExecResult>;

    /// The write key on file for an owner, if any (new owners have none yet).
    async fn read_write_key(&self, owner_id: [u8; 16]) -> Result<Option<WriteKey>>;

    /// Bytes currently stored for an owner.
    async fn read_usage(&self, owner_id: [u8; 16]) -> Result<u64>;

    /// Every timestamp stored for an owner, in ascending order; backs the
    /// relay's own fingerprint index.
    async fn timestamps(&self, owner_id: [u8; 16]) -> Result<Vec<Timestamp>>;

    /// Encrypted messages for an owner whose timestamp falls in
    /// `[lower, upper)`, in ascending timestamp order.
    async fn messages_in_range(
        &self,
        owner_id: [u8; 16],
        lower: Option<Timestamp>,
        upper: Option<Timestamp>,
    ) -> Result<Vec<(Timestamp, Vec<u8>)>>;
}

#[derive(Default)]
struct MemoryState {
    write_keys: BTreeMap<[u8; 16], WriteKey>,
    messages: BTreeMap<([u8; 16], Timestamp), Vec<u8>>,
    usage: BTreeMap<[u8; 16], u64>,
}

/// An in-memory [`RelayDriver`], backed by `BTreeMap`s guarded by a mutex.
/// Suitable for tests and single-process deployments without a real database.
#[derive(Default)]
pub struct MemoryRelayDriver {
    state: Mutex<MemoryState>,
}

impl MemoryRelayDriver {
    /// An empty driver.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayDriver for MemoryRelayDriver {
    async fn transaction(&self, statements: Vec<RelayStatement>) -> Result<RelayExecResult> {
        let mut state = self.state.lock();
        let mut result = RelayExecResult::default();
        for stmt in statements {
            match stmt {
                RelayStatement::SetWriteKey { owner_id, write_key } => {
                    state.write_keys.entry(owner_id).or_insert(write_key);
                }
                RelayStatement::InsertMessage { owner_id, timestamp, ciphertext } => {
                    let key = (owner_id, timestamp);
                    let inserted = !state.messages.contains_key(&key);
                    if inserted {
                        state.messages.insert(key, ciphertext);
                    }
                    result.inserted.push(inserted);
                }
                RelayStatement::IncrementUsage { owner_id, delta_bytes } => {
                    *state.usage.entry(owner_id).or_insert(0) += delta_bytes;
                }
                RelayStatement::DeleteOwner { owner_id } => {
                    state.write_keys.remove(&owner_id);
                    state.messages.retain(|(oid, _), _| *oid != owner_id);
                    state.usage.remove(&owner_id);
                }
            }
        }
        Ok(result)
    }

    async fn read_write_key(&self, owner_id: [u8; 16]) -> Result<Option<WriteKey>> {
        Ok(self.state.lock().write_keys.get(&owner_id).copied())
    }

    async fn read_usage(&self, owner_id: [u8; 16]) -> Result<u64> {
        Ok(self.state.lock().usage.get(&owner_id).copied().unwrap_or(0))
    }

    async fn timestamps(&self, owner_id: [u8; 16]) -> Result<Vec<Timestamp>> {
        Ok(self
            .state
            .lock()
            .messages
            .keys()
            .filter(|(oid, _)| *oid == owner_id)
            .map(|(_, ts)| *ts)
            .collect())
    }

    async fn messages_in_range(
        &self,
        owner_id: [u8; 16],
        lower: Option<Timestamp>,
        upper: Option<Timestamp>,
    ) -> Result<Vec<(Timestamp, Vec<u8>)>> {
        let state = self.state.lock();
        let mut out: Vec<(Timestamp, Vec<u8>)> = state
            .messages
            .iter()
            .filter(|((oid, ts), _)| {
                *oid == owner_id
                    && lower.map(|l| *ts >= l).unwrap_or(true)
                    && upper.map(|u| *ts < u).unwrap_or(true)
            })
            .map(|((_, ts), ciphertext)| (*ts, ciphertext.clone()))
            .collect();
        out.sort_by_key(|(ts, _)| *ts);
        Ok(out)
    }
}
