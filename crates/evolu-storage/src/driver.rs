//! The storage driver collaborator contract, plus an in-memory reference
//! implementation used by tests and by callers that don't need persistence.
//!
//! The real SQLite/OPFS/WASM adapters are out of scope here; this crate only
//! defines the shape a driver must present and ships one driver good enough
//! to exercise every operation above it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use evolu_clock::Timestamp;
use evolu_protocol::Value;

use crate::error::{Result, StorageError};

/// A row id, as raw bytes (matches the `BLOB` id column in the persisted layout).
pub type RowId = Vec<u8>;

/// One durable statement, applied atomically inside [`StorageDriver::transaction`].
#[derive(Debug, Clone)]
pub enum Statement {
    /// Insert one history row, unless `(owner, table, id, column, timestamp)` already exists.
    InsertHistory {
        /// Owning user.
        owner_id: [u8; 16],
        /// Target table.
        table: String,
        /// Row id.
        id: RowId,
        /// Column name.
        column: String,
        /// Stamping timestamp.
        timestamp: Timestamp,
        /// New value.
        value: Value,
    },
    /// Upsert a projection cell, but only if `timestamp` is greater than the
    /// timestamp currently recorded for this cell (last-write-wins).
    UpsertProjection {
        /// Owning user.
        owner_id: [u8; 16],
        /// Target table.
        table: String,
        /// Row id.
        id: RowId,
        /// Column name.
        column: String,
        /// Stamping timestamp.
        timestamp: Timestamp,
        /// New value.
        value: Value,
    },
    /// Upsert a local-only (`_`-prefixed) table row, outside the CRDT model.
    UpsertLocal {
        /// Target table; must start with `_`.
        table: String,
        /// Row id.
        id: RowId,
        /// Column values to write.
        values: BTreeMap<String, Value>,
        /// Wall-clock milliseconds to stamp `updatedAt` with.
        updated_at_millis: u64,
    },
    /// Delete a local-only table row.
    DeleteLocal {
        /// Target table; must start with `_`.
        table: String,
        /// Row id.
        id: RowId,
    },
    /// Persist the clock's current timestamp for an owner.
    PersistClock {
        /// Owning user.
        owner_id: [u8; 16],
        /// Timestamp to persist.
        timestamp: Timestamp,
    },
    /// Drop every table belonging to an owner (reset/restore).
    DropOwner {
        /// Owning user.
        owner_id: [u8; 16],
    },
}

/// Outcome of applying a batch of statements.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Total rows changed across the batch.
    pub changes: usize,
    /// Per-`InsertHistory`-statement flag: `true` if newly inserted, `false`
    /// if the unique constraint already held that exact row (idempotent no-op).
    pub inserted: Vec<bool>,
}

/// The storage driver collaborator API the engine requires.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Apply `statements` as one all-or-nothing transaction. A failure on
    /// any statement rolls back every statement already applied in this call.
    async fn transaction(&self, statements: Vec<Statement>) -> Result<ExecResult>;

    /// Read the current projection row for `table`/`id`, if any.
    async fn read_projection(
        &self,
        owner_id: [u8; 16],
        table: &str,
        id: &[u8],
    ) -> Result<Option<BTreeMap<String, Value>>>;

    /// Read back the last persisted clock timestamp for an owner, if any.
    async fn read_clock(&self, owner_id: [u8; 16]) -> Result<Option<Timestamp>>;

    /// Every history row for an owner, in insertion (timestamp) order.
    async fn history_rows(&self, owner_id: [u8; 16]) -> Result<Vec<(String, RowId, String, Timestamp, Value)>>;

    /// Self-contained byte snapshot of everything this driver holds.
    async fn export(&self) -> Result<Vec<u8>>;
}

type OwnerTableId = ([u8; 16], String, RowId);

#[derive(Default)]
struct MemoryState {
    history: BTreeMap<(OwnerTableId, String, Timestamp), Value>,
    projection: BTreeMap<OwnerTableId, BTreeMap<String, (Timestamp, Value)>>,
    local: BTreeMap<(String, RowId), BTreeMap<String, Value>>,
    clocks: BTreeMap<[u8; 16], Timestamp>,
}

/// An in-memory [`StorageDriver`], backed by `BTreeMap`s guarded by a mutex.
/// Never persists anything; suitable for tests and for a fully local-only
/// deployment (`transports: []`).
#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
}

impl MemoryDriver {
    /// An empty driver.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn transaction(&self, statements: Vec<Statement>) -> Result<ExecResult> {
        let mut state = self.state.lock();
        let mut result = ExecResult::default();
        for stmt in statements {
            match stmt {
                Statement::InsertHistory { owner_id, table, id, column, timestamp, value } => {
                    let key = ((owner_id, table, id), column, timestamp);
                    let inserted = !state.history.contains_key(&key);
                    if inserted {
                        state.history.insert(key, value);
                        result.changes += 1;
                    }
                    result.inserted.push(inserted);
                }
                Statement::UpsertProjection { owner_id, table, id, column, timestamp, value } => {
                    let key = (owner_id, table, id);
                    let cell = state.projection.entry(key).or_default();
                    let should_write = match cell.get(&column) {
                        Some((existing, _)) => timestamp > *existing,
                        None => true,
                    };
                    if should_write {
                        cell.insert(column, (timestamp, value));
                        result.changes += 1;
                    }
                }
                Statement::UpsertLocal { table, id, values, updated_at_millis } => {
                    if !table.starts_with('_') {
                        return Err(StorageError::Validation(format!(
                            "UpsertLocal on non-local table {table}"
                        )));
                    }
                    let row = state.local.entry((table, id)).or_default();
                    for (col, val) in values {
                        row.insert(col, val);
                    }
                    row.insert("updatedAt".to_string(), Value::Integer(updated_at_millis as i64));
                    result.changes += 1;
                }
                Statement::DeleteLocal { table, id } => {
                    if state.local.remove(&(table, id)).is_some() {
                        result.changes += 1;
                    }
                }
                Statement::PersistClock { owner_id, timestamp } => {
                    state.clocks.insert(owner_id, timestamp);
                    result.changes += 1;
                }
                Statement::DropOwner { owner_id } => {
                    state.history.retain(|(otid, _, _), _| otid.0 != owner_id);
                    state.projection.retain(|otid, _| otid.0 != owner_id);
                    state.clocks.remove(&owner_id);
                    result.changes += 1;
                }
            }
        }
        Ok(result)
    }

    async fn read_projection(
        &self,
        owner_id: [u8; 16],
        table: &str,
        id: &[u8],
    ) -> Result<Option<BTreeMap<String, Value>>> {
        let state = self.state.lock();
        Ok(state
            .projection
            .get(&(owner_id, table.to_string(), id.to_vec()))
            .map(|cells| cells.iter().map(|(col, (_, val))| (col.clone(), val.clone())).collect()))
    }

    async fn read_clock(&self, owner_id: [u8; 16]) -> Result<Option<Timestamp>> {
        Ok(self.state.lock().clocks.get(&owner_id).copied())
    }

    async fn history_rows(&self, owner_id: [u8; 16]) -> Result<Vec<(String, RowId, String, Timestamp, Value)>> {
        Ok(self
            .state
            .lock()
            .history
            .iter()
            .filter(|(((oid, _, _), _, _), _)| *oid == owner_id)
            .map(|(((_, table, id), column, ts), value)| {
                (table.clone(), id.clone(), column.clone(), *ts, value.clone())
            })
            .collect())
    }

    async fn export(&self) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let mut out = Vec::new();
        out.extend((state.history.len() as u64).to_le_bytes());
        out.extend((state.projection.len() as u64).to_le_bytes());
        out.extend((state.local.len() as u64).to_le_bytes());
        Ok(out)
    }
}
