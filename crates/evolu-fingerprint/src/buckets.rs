//! Deterministic balanced partitioning of an index into comparison buckets.
//!
//! Reconciliation splits a range into a bounded number of sub-ranges and
//! exchanges one fingerprint per sub-range; both sides must derive identical
//! boundaries from nothing but `n`, so this is pure arithmetic, not a stored
//! tree shape.

use crate::fingerprint::Fingerprint;
use crate::index::FingerprintIndex;

/// Hard cap on the number of sub-ranges produced per reconciliation step.
pub const MAX_BUCKETS: usize = 16;

/// A half-open `[lo, hi)` slice of index positions, one fanout step of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Inclusive lower bound (index position).
    pub lo: usize,
    /// Exclusive upper bound (index position).
    pub hi: usize,
}

impl Bucket {
    /// Number of elements this bucket spans.
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    /// Whether this bucket spans no elements.
    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }
}

/// Split `[lo, hi)` into at most [`MAX_BUCKETS`] contiguous, near-equal-sized
/// buckets. Deterministic given `lo` and `hi` alone: both reconciliation
/// peers, holding the same range over equally-ordered data, produce
/// byte-identical boundaries without exchanging them.
///
/// When `hi - lo <= 1` there is nothing left to split and a single bucket
/// covering the whole range is returned (the recursion's base case).
pub fn compute_balanced_buckets(lo: usize, hi: usize) -> Vec<Bucket> {
    let n = hi - lo;
    if n <= 1 {
        return vec![Bucket { lo, hi }];
    }
    let bucket_count = n.min(MAX_BUCKETS);
    let base = n / bucket_count;
    let remainder = n % bucket_count;

    let mut buckets = Vec::with_capacity(bucket_count);
    let mut cursor = lo;
    for i in 0..bucket_count {
        // The first `remainder` buckets absorb one extra element each so
        // sizes differ by at most one, not by the full remainder.
        let size = base + usize::from(i < remainder);
        buckets.push(Bucket { lo: cursor, hi: cursor + size });
        cursor += size;
    }
    debug_assert_eq!(cursor, hi);
    buckets
}

/// Fingerprint each bucket against `index`, in bucket order.
pub fn fingerprint_ranges(index: &FingerprintIndex, buckets: &[Bucket]) -> Vec<Fingerprint> {
    buckets.iter().map(|b| index.fingerprint(b.lo, b.hi)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_partition_the_range_exactly() {
        let buckets = compute_balanced_buckets(0, 100);
        assert_eq!(buckets.first().unwrap().lo, 0);
        assert_eq!(buckets.last().unwrap().hi, 100);
        for w in buckets.windows(2) {
            assert_eq!(w[0].hi, w[1].lo);
        }
        let total: usize = buckets.iter().map(Bucket::len).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn never_exceeds_max_buckets() {
        let buckets = compute_balanced_buckets(0, 10_000);
        assert!(buckets.len() <= MAX_BUCKETS);
    }

    #[test]
    fn bucket_sizes_differ_by_at_most_one() {
        let buckets = compute_balanced_buckets(0, 37);
        let sizes: Vec<usize> = buckets.iter().map(Bucket::len).collect();
        let (min, max) = (*sizes.iter().min().unwrap(), *sizes.iter().max().unwrap());
        assert!(max - min <= 1);
    }

    #[test]
    fn small_ranges_collapse_to_one_bucket() {
        assert_eq!(compute_balanced_buckets(5, 5), vec![Bucket { lo: 5, hi: 5 }]);
        assert_eq!(compute_balanced_buckets(5, 6), vec![Bucket { lo: 5, hi: 6 }]);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        assert_eq!(compute_balanced_buckets(3, 91), compute_balanced_buckets(3, 91));
    }

    #[test]
    fn fingerprints_of_buckets_xor_to_whole_range_fingerprint() {
        let mut idx = FingerprintIndex::new();
        for i in 0..64u64 {
            let mut t = [0u8; 12];
            t[..8].copy_from_slice(&i.to_be_bytes());
            idx.insert(t);
        }
        let buckets = compute_balanced_buckets(0, idx.size());
        let fps = fingerprint_ranges(&idx, &buckets);
        let combined = fps.into_iter().fold(Fingerprint::ZERO, |acc, f| acc ^ f);
        assert_eq!(combined, idx.fingerprint(0, idx.size()));
    }
}
