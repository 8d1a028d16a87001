//! Hybrid logical clock send/receive rules and the per-owner [`Clock`] state.

use crate::error::{ClockError, Result};
use crate::timestamp::{NodeId, Timestamp, MAX_COUNTER, MAX_MILLIS};

/// Default drift tolerance: 5 minutes.
pub const DEFAULT_MAX_DRIFT_MS: u64 = 5 * 60 * 1000;

/// Pure send rule: advance `current` past `now`, bumping the logical counter
/// when the millisecond doesn't move.
///
/// `now` is the caller's wall clock in epoch milliseconds.
pub fn send_timestamp(current: Timestamp, now: u64, max_drift_ms: u64) -> Result<Timestamp> {
    let millis_new = current.millis().max(now);
    check_drift(millis_new, now, max_drift_ms)?;

    let counter_new = if millis_new == current.millis() {
        current.counter() as u32 + 1
    } else {
        0
    };
    if counter_new >= MAX_COUNTER {
        return Err(ClockError::CounterOverflow { millis: millis_new });
    }

    Timestamp::new(millis_new, counter_new as u16, current.node())
        .map_err(|_| ClockError::CounterOverflow { millis: millis_new })
}

/// Pure receive rule: merge a remote timestamp into `local`, advancing past
/// whichever of `now`, `local`, and `remote` is greatest.
pub fn receive_timestamp(
    local: Timestamp,
    remote: Timestamp,
    now: u64,
    max_drift_ms: u64,
) -> Result<Timestamp> {
    if remote.node() == local.node() {
        return Err(ClockError::DuplicateNode);
    }

    let millis_new = now.max(local.millis()).max(remote.millis());
    check_drift(millis_new, now, max_drift_ms)?;

    let counter_new = if millis_new == local.millis() && millis_new == remote.millis() {
        local.counter().max(remote.counter()) as u32 + 1
    } else if millis_new == local.millis() {
        local.counter() as u32 + 1
    } else if millis_new == remote.millis() {
        remote.counter() as u32 + 1
    } else {
        0
    };
    if counter_new >= MAX_COUNTER {
        return Err(ClockError::CounterOverflow { millis: millis_new });
    }

    Timestamp::new(millis_new, counter_new as u16, local.node())
        .map_err(|_| ClockError::CounterOverflow { millis: millis_new })
}

fn check_drift(millis_new: u64, now: u64, max_drift_ms: u64) -> Result<()> {
    if millis_new >= MAX_MILLIS {
        return Err(ClockError::CounterOverflow { millis: millis_new });
    }
    let drift = millis_new as i64 - now as i64;
    if drift > max_drift_ms as i64 {
        return Err(ClockError::Drift { drift_ms: drift, max_drift_ms });
    }
    Ok(())
}

/// Process-wide per-owner clock state.
///
/// Every emitted timestamp is strictly greater than any previously emitted or
/// observed one for that owner. Callers are responsible for persisting
/// [`Clock::current`] inside the same transaction as the message it stamps.
#[derive(Debug, Clone)]
pub struct Clock {
    current: Timestamp,
    max_drift_ms: u64,
}

impl Clock {
    /// Start a clock at the zero timestamp for `node`.
    pub fn new(node: NodeId) -> Self {
        Self { current: Timestamp::epoch(node), max_drift_ms: DEFAULT_MAX_DRIFT_MS }
    }

    /// Restore a clock from a previously persisted timestamp.
    pub fn restore(current: Timestamp, max_drift_ms: u64) -> Self {
        Self { current, max_drift_ms }
    }

    /// Override the drift tolerance.
    pub fn with_max_drift(mut self, max_drift_ms: u64) -> Self {
        self.max_drift_ms = max_drift_ms;
        self
    }

    /// The most recently emitted or observed timestamp.
    pub fn current(&self) -> Timestamp {
        self.current
    }

    /// Stamp a locally originated event, advancing the clock.
    pub fn send(&mut self, now_ms: u64) -> Result<Timestamp> {
        let next = send_timestamp(self.current, now_ms, self.max_drift_ms)?;
        self.current = next;
        Ok(next)
    }

    /// Merge in a remote timestamp, advancing the clock past both sides.
    pub fn receive(&mut self, remote: Timestamp, now_ms: u64) -> Result<Timestamp> {
        let next = receive_timestamp(self.current, remote, now_ms, self.max_drift_ms)?;
        self.current = next;
        Ok(next)
    }
}
