//! Per-owner range-fingerprint index for anti-entropy reconciliation.
//!
//! Every device keeps an ordered index of the 12-byte timestamps it has
//! applied, and derives an XOR fingerprint over arbitrary `[lo, hi)` ranges of
//! it. Two peers holding the same set of timestamps compute the same whole-
//! range fingerprint; when they diverge, the range can be recursively split
//! into [`buckets::MAX_BUCKETS`] balanced sub-ranges and compared until the
//! mismatching leaf ranges are small enough to exchange directly.

pub mod buckets;
pub mod fingerprint;
pub mod index;

pub use buckets::{compute_balanced_buckets, fingerprint_ranges, Bucket, MAX_BUCKETS};
pub use fingerprint::Fingerprint;
pub use index::{FingerprintIndex, InsertStrategy};
