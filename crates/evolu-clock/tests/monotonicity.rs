//! Clock monotonicity under arbitrary send/receive sequences.

use evolu_clock::{Clock, Timestamp, DEFAULT_MAX_DRIFT_MS};
use proptest::prelude::*;

fn node(byte: u8) -> [u8; 16] {
    [byte; 16]
}

proptest! {
    #[test]
    fn emitted_timestamps_strictly_increase(
        steps in prop::collection::vec((any::<bool>(), 0u64..1_000_000), 1..200)
    ) {
        let mut clock = Clock::new(node(7));
        let mut last = clock.current();
        for (is_send, now_offset) in steps {
            // Keep `now` monotonic-ish but allow some jitter within drift bounds.
            let now = last.millis() + now_offset % (DEFAULT_MAX_DRIFT_MS / 2);
            let next = if is_send {
                match clock.send(now) {
                    Ok(t) => t,
                    Err(_) => continue,
                }
            } else {
                let remote = Timestamp::new(now, 0, node(8)).unwrap();
                match clock.receive(remote, now) {
                    Ok(t) => t,
                    Err(_) => continue,
                }
            };
            prop_assert!(next > last);
            last = next;
        }
    }
}
