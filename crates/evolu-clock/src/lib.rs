//! The per-owner hybrid logical clock.
//!
//! A [`Clock`] blends wall time with a logical counter so that every emitted
//! timestamp is strictly greater than any previously emitted or observed one
//! for that owner, even across devices with slightly skewed clocks. Storage
//! commits advance the clock and persist [`Clock::current`] inside the same
//! transaction as the message it stamps.

pub mod clock;
pub mod error;
pub mod timestamp;

pub use clock::{receive_timestamp, send_timestamp, Clock, DEFAULT_MAX_DRIFT_MS};
pub use error::{ClockError, Result};
pub use timestamp::{NodeId, Timestamp, TimestampRangeError, MAX_COUNTER, MAX_MILLIS};
