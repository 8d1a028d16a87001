//! Message types and wire framing for client/relay reconciliation sessions.
//!
//! This crate is pure codec: it knows how to shape and parse frames and
//! payloads, but never touches a socket, a clock, or a fingerprint index.
//! `evolu-sync` drives the actual reconciliation state machine on top of it.

pub mod error;
pub mod frame;
pub mod message;
pub mod reconcile;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use frame::{ErrorKind, Frame, FingerprintRange, NeedRange};
pub use message::{deserialize_message, serialize_message, CrdtMessage, DbChange, EncryptedCrdtMessage, Value};
pub use reconcile::{is_leaf_range, mismatched_ranges, MismatchedRange, LEAF_THRESHOLD};
pub use wire::{decode_frame, encode_frame, PROTOCOL_VERSION};
