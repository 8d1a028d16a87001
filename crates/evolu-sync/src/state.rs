//! The per-`(owner, transport)` sync state machine and its pure transitions.

use std::time::Duration;

/// Where one owner's session against one transport currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// Nothing pending; no connection held.
    Idle,
    /// A transport connection is being established.
    Connecting,
    /// Frames are being exchanged to converge the fingerprint index.
    Reconciling,
    /// A transport or protocol error ended the session; waiting out a delay
    /// before the next attempt.
    Backoff {
        /// Attempts made so far, used to size the next delay.
        attempt: u32,
        /// How long this backoff lasts.
        delay: Duration,
    },
}

/// What caused a transition, decoupling the event source from the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A local mutation was enqueued, or the transport became reachable.
    WorkAvailable,
    /// The `Initiate` handshake completed; frames can now be exchanged.
    HandshakeComplete,
    /// One full round converged with no mismatches.
    RoundConverged,
    /// The transport dropped, timed out, or refused to connect.
    TransportError,
    /// A frame failed to decode, carried a protocol version mismatch, or the
    /// relay rejected the session (auth/quota).
    ProtocolError,
    /// The owner was removed, a reset was invoked, or the session was cancelled.
    Cancelled,
}

/// Apply `event` to `state`, returning the next state. `next_backoff` sizes
/// the delay for a fresh attempt count; the caller (not this function) owns
/// the attempt counter across repeated failures, since `Connecting` and
/// `Reconciling` don't themselves carry one. Unrecognized combinations (an
/// event that doesn't apply from the current state) leave `state` unchanged.
pub fn transition(
    state: &SyncState,
    event: &SyncEvent,
    attempt: u32,
    next_backoff: impl FnOnce(u32) -> Duration,
) -> SyncState {
    use SyncEvent::*;
    use SyncState::*;

    match (state, event) {
        (_, Cancelled) => Idle,
        (Idle, WorkAvailable) => Connecting,
        (Connecting, HandshakeComplete) => Reconciling,
        (Connecting, TransportError) | (Connecting, ProtocolError) => {
            Backoff { attempt, delay: next_backoff(attempt) }
        }
        (Reconciling, RoundConverged) => Idle,
        (Reconciling, TransportError) | (Reconciling, ProtocolError) => {
            Backoff { attempt, delay: next_backoff(attempt) }
        }
        (Backoff { .. }, WorkAvailable) => Connecting,
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_backoff(_attempt: u32) -> Duration {
        Duration::from_millis(0)
    }

    #[test]
    fn idle_moves_to_connecting_on_work() {
        let next = transition(&SyncState::Idle, &SyncEvent::WorkAvailable, 0, zero_backoff);
        assert_eq!(next, SyncState::Connecting);
    }

    #[test]
    fn connecting_moves_to_reconciling_on_handshake() {
        let next = transition(&SyncState::Connecting, &SyncEvent::HandshakeComplete, 0, zero_backoff);
        assert_eq!(next, SyncState::Reconciling);
    }

    #[test]
    fn reconciling_converges_to_idle() {
        let next = transition(&SyncState::Reconciling, &SyncEvent::RoundConverged, 0, zero_backoff);
        assert_eq!(next, SyncState::Idle);
    }

    #[test]
    fn transport_error_enters_backoff_from_either_connecting_or_reconciling() {
        let a = transition(&SyncState::Connecting, &SyncEvent::TransportError, 1, zero_backoff);
        let b = transition(&SyncState::Reconciling, &SyncEvent::TransportError, 1, zero_backoff);
        assert!(matches!(a, SyncState::Backoff { attempt: 1, .. }));
        assert!(matches!(b, SyncState::Backoff { attempt: 1, .. }));
    }

    #[test]
    fn cancelled_always_returns_to_idle() {
        for state in [
            SyncState::Idle,
            SyncState::Connecting,
            SyncState::Reconciling,
            SyncState::Backoff { attempt: 3, delay: Duration::from_secs(1) },
        ] {
            assert_eq!(transition(&state, &SyncEvent::Cancelled, 3, zero_backoff), SyncState::Idle);
        }
    }

    #[test]
    fn unrecognized_event_leaves_state_unchanged() {
        let next = transition(&SyncState::Idle, &SyncEvent::RoundConverged, 0, zero_backoff);
        assert_eq!(next, SyncState::Idle);
    }
}
