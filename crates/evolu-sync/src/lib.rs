//! Client-side reconciliation: a pure state machine over backoff/retry, a
//! reconciler that turns fingerprint mismatches into wire frames, and the
//! session driver that ties both to a [`evolu_transport::Transport`].

pub mod backoff;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod state;

pub use backoff::delay_for_attempt;
pub use error::{Result, SyncError};
pub use reconciler::ClientReconciler;
pub use session::{SyncSession, MAX_ATTEMPTS};
pub use state::{transition, SyncEvent, SyncState};
