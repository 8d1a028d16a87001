//! Clock invariant violations.
//!
//! All three are fatal to the operation that raised them: the caller's
//! transaction rolls back without advancing the clock.

/// Errors raised by [`crate::send_timestamp`] and [`crate::receive_timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The wall clock disagrees with the proposed timestamp by more than the
    /// configured `max_drift`.
    #[error("clock drift {drift_ms}ms exceeds max_drift {max_drift_ms}ms")]
    Drift {
        /// Observed drift in milliseconds.
        drift_ms: i64,
        /// The configured bound.
        max_drift_ms: u64,
    },

    /// The 16-bit logical counter would wrap within the same millisecond.
    #[error("logical counter overflow at millis {millis}")]
    CounterOverflow {
        /// The millisecond at which the overflow occurred.
        millis: u64,
    },

    /// A received remote timestamp carries this clock's own node id.
    ///
    /// An owner should never observe its own node id arriving as a remote
    /// timestamp.
    #[error("received timestamp from own node id")]
    DuplicateNode,
}

/// Result alias for clock operations.
pub type Result<T> = std::result::Result<T, ClockError>;
