//! Session frames exchanged between a client and a relay during reconciliation.

/// One bucket's boundary and fingerprint, as carried in a `RangeFingerprints`
/// frame. `None` is the `+∞` sentinel for the topmost range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintRange {
    /// Exclusive upper bound of this range, or the `+∞` sentinel.
    pub upper_bound: Option<[u8; 12]>,
    /// XOR fingerprint of every timestamp in `[previous upper bound, upper_bound)`.
    pub fingerprint: [u8; 12],
}

/// A sub-range the requester wants the peer's raw messages for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedRange {
    /// Inclusive lower bound.
    pub lower: [u8; 12],
    /// Exclusive upper bound, or the `+∞` sentinel.
    pub upper: Option<[u8; 12]>,
}

/// A session-terminal error kind, carried in an [`Frame::Error`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The presented write key did not match the one on file for this owner.
    Auth,
    /// The owner has exceeded its storage quota.
    Quota,
    /// A frame could not be decoded.
    FrameDecode,
    /// The peer's protocol version is unsupported.
    ProtocolVersion,
}

/// The frames a client/relay reconciliation session exchanges. Every frame is
/// scoped to one owner; a transport connection may interleave frames for
/// several owners.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Opens a reconciliation session for `owner_id`, presenting proof of
    /// write access and the client's top-level fingerprint ranges.
    Initiate {
        /// 16-byte owner identifier.
        owner_id: [u8; 16],
        /// 16-byte write-key proof.
        write_key: [u8; 16],
        /// The sender's top-level balanced-bucket fingerprints.
        client_fingerprint_ranges: Vec<FingerprintRange>,
    },
    /// Offers fingerprints over a (possibly narrowed) range, following
    /// `computeBalancedBuckets` over that range's element count.
    RangeFingerprints {
        /// 16-byte owner identifier.
        owner_id: [u8; 16],
        /// Exclusive lower bound of the whole `ranges` list, or `None` for
        /// the start of the index. Carried explicitly because a narrowed,
        /// recursed-into span's starting point isn't otherwise recoverable
        /// from the ranges alone.
        lower: Option<[u8; 12]>,
        /// The offered ranges, in increasing upper-bound order.
        ranges: Vec<FingerprintRange>,
    },
    /// Requests the peer's raw messages for the listed sub-ranges.
    NeedMessages {
        /// 16-byte owner identifier.
        owner_id: [u8; 16],
        /// Sub-ranges to stream, by inclusive lower / exclusive upper timestamp.
        ranges: Vec<NeedRange>,
    },
    /// Streams encrypted messages in timestamp order. `done` marks the end of
    /// this side's response to one `NeedMessages` request.
    Messages {
        /// 16-byte owner identifier.
        owner_id: [u8; 16],
        /// Messages in this batch, in ascending timestamp order.
        encrypted_messages: Vec<crate::message::EncryptedCrdtMessage>,
        /// Whether this is the final batch for the outstanding request.
        done: bool,
    },
    /// Acknowledges receipt of messages up to and including `up_to`, for flow control.
    Ack {
        /// 16-byte owner identifier.
        owner_id: [u8; 16],
        /// The highest acknowledged timestamp, in its 12-byte binary form.
        up_to: [u8; 12],
    },
    /// Terminal for this owner's session.
    Error {
        /// The kind of failure.
        kind: ErrorKind,
        /// Human-readable detail, for logs.
        detail: String,
    },
}
