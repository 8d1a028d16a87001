//! Replication message types: application deltas, decrypted CRDT messages,
//! and the encrypted form that travels over the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use evolu_clock::Timestamp;

use crate::error::{ProtocolError, Result};

/// A column value as stored in history and projection tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Blob(Vec<u8>),
}

/// An application-level row delta, produced by a single mutation call.
///
/// `values` never carries the reserved columns `id`, `createdAt`, `updatedAt`,
/// `isDeleted` — those are managed by the storage layer, not the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbChange {
    /// Target table name.
    pub table: String,
    /// Row id.
    pub id: Vec<u8>,
    /// Column name to new value, for columns actually being written.
    pub values: BTreeMap<String, Value>,
    /// Whether this delta creates the row.
    pub is_insert: bool,
    /// Whether this delta soft-deletes the row (sets `isDeleted=1`).
    pub is_delete: bool,
}

/// A single column write, stamped by the clock. One [`DbChange`] fans out
/// into one `CrdtMessage` per column (plus the system columns the storage
/// layer maintains).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtMessage {
    /// The clock timestamp stamping this write.
    pub timestamp: Timestamp,
    /// Target table name.
    pub table: String,
    /// Row id.
    pub id: Vec<u8>,
    /// Column name.
    pub column: String,
    /// New value for the column.
    pub value: Value,
}

/// The encrypted form of a [`CrdtMessage`] as it travels over the wire and
/// sits in the relay's message store. The relay never sees `column`/`value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedCrdtMessage {
    /// The clock timestamp; also serves as the AEAD nonce source.
    pub timestamp: Timestamp,
    /// `AEAD_encrypt(encryptionKey, nonce, serialize(CrdtMessage), aad=ownerId)`.
    pub ciphertext: Vec<u8>,
}

/// Serialize a [`CrdtMessage`] to the byte string that gets encrypted.
pub fn serialize_message(msg: &CrdtMessage) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| ProtocolError::PayloadCodec(e.to_string()))
}

/// Inverse of [`serialize_message`], run on the plaintext after decryption.
pub fn deserialize_message(bytes: &[u8]) -> Result<CrdtMessage> {
    bincode::deserialize(bytes).map_err(|e| ProtocolError::PayloadCodec(e.to_string()))
}
