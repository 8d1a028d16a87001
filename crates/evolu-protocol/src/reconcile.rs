//! Pure comparison helpers for the range-fingerprint reconciliation
//! algorithm. Deciding whether a mismatch is a "leaf" (ship raw messages) or
//! needs further recursion depends on how many timestamps fall in that range,
//! which only the side holding the index knows — so that decision is made by
//! the caller (the sync engine), not here.

use crate::frame::FingerprintRange;

/// Sub-ranges smaller than this (on both sides) are shipped as raw messages
/// instead of being split further, bounding worst-case bytes per round.
pub const LEAF_THRESHOLD: usize = 128;

/// A mismatching sub-range, identified by its exclusive bounds. `lower` is
/// `None` only for the very first range in the list (start of the set);
/// `upper` is `None` for the `+∞` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchedRange {
    /// Exclusive lower bound, or `None` for the start of the set.
    pub lower: Option<[u8; 12]>,
    /// Exclusive upper bound, or `None` for the `+∞` sentinel.
    pub upper: Option<[u8; 12]>,
}

/// Compare two aligned range-fingerprint lists element-wise and return the
/// ranges whose fingerprints disagree.
///
/// Both lists must share the same bucket boundaries — the common case, since
/// `computeBalancedBuckets(n)` is deterministic in `n` and both sides
/// typically hold (nearly) the same count. When the lists have different
/// lengths, the caller must first realign them (mapping the larger side's
/// boundaries onto the smaller side's index via `find_lower_bound`) before
/// calling this function; passing misaligned lists here is a logic error on
/// the caller's part, not something this function can recover from, so it
/// conservatively reports the entire compared prefix as mismatched.
pub fn mismatched_ranges(local: &[FingerprintRange], peer: &[FingerprintRange]) -> Vec<MismatchedRange> {
    let mut out = Vec::new();
    let mut lower = None;
    let len = local.len().min(peer.len());
    for i in 0..len {
        let (l, p) = (&local[i], &peer[i]);
        if l.upper_bound != p.upper_bound || l.fingerprint != p.fingerprint {
            out.push(MismatchedRange { lower, upper: l.upper_bound });
        }
        lower = l.upper_bound;
    }
    if local.len() != peer.len() {
        out.push(MismatchedRange { lower, upper: None });
    }
    out
}

/// Whether a mismatching range with `count` timestamps (on the larger side)
/// should be shipped directly rather than split further.
pub fn is_leaf_range(count: usize) -> bool {
    count <= LEAF_THRESHOLD
}
