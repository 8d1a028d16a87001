//! Server-side storage for reconciliation sessions: ciphertext, timestamps,
//! and per-owner usage only — this crate never touches an encryption key.

pub mod driver;
pub mod engine;
pub mod error;
pub mod quota;
pub mod session;

pub use driver::{MemoryRelayDriver, RelayDriver, RelayExecResult, RelayStatement, WriteKey};
pub use engine::RelayEngine;
pub use error::{RelayError, Result};
pub use quota::{is_owner_within_quota, DEFAULT_QUOTA_BYTES};
pub use session::RelaySession;
