//! Turns incoming frames from a client into storage operations and the
//! frames that answer them. The relay never computes its own fingerprint
//! diff; it only ever mirrors whatever boundaries the client already chose.

use std::sync::Arc;

use evolu_protocol::{ErrorKind, Frame};

use crate::driver::RelayDriver;
use crate::engine::RelayEngine;
use crate::error::{RelayError, Result};

/// Handles one client's frames against a [`RelayEngine`]. Stateless beyond
/// the engine itself, so one instance can serve every connection.
pub struct RelaySession<D: RelayDriver> {
    engine: Arc<RelayEngine<D>>,
}

impl<D: RelayDriver> RelaySession<D> {
    /// Wrap the engine this session reads and writes through.
    pub fn new(engine: Arc<RelayEngine<D>>) -> Self {
        Self { engine }
    }

    /// React to one frame, producing zero or more frames to send back. A
    /// rejected `Initiate` or an over-quota `Messages` batch yields a single
    /// `Error` frame rather than an `Err`, since that's a session-terminal
    /// protocol outcome, not a local fault.
    pub async fn handle_frame(&self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Initiate { owner_id, write_key, client_fingerprint_ranges } => {
                if let Err(err) = self.engine.admit(owner_id, write_key).await {
                    return Ok(vec![error_frame(err)]);
                }
                let boundaries: Vec<_> = client_fingerprint_ranges.iter().map(|r| r.upper_bound).collect();
                let ranges = self.engine.ranges_at_boundaries(owner_id, None, &boundaries).await?;
                Ok(vec![Frame::RangeFingerprints { owner_id, lower: None, ranges }])
            }
            Frame::RangeFingerprints { owner_id, lower, ranges } => {
                let boundaries: Vec<_> = ranges.iter().map(|r| r.upper_bound).collect();
                let mirrored = self.engine.ranges_at_boundaries(owner_id, lower, &boundaries).await?;
                Ok(vec![Frame::RangeFingerprints { owner_id, lower, ranges: mirrored }])
            }
            Frame::NeedMessages { owner_id, ranges } => {
                let mut out = Vec::with_capacity(ranges.len());
                for range in ranges {
                    let encrypted_messages =
                        self.engine.messages_in_range(owner_id, Some(range.lower), range.upper).await?;
                    out.push(Frame::Messages { owner_id, encrypted_messages, done: true });
                }
                Ok(out)
            }
            Frame::Messages { owner_id, encrypted_messages, done } => {
                match self.engine.ingest_messages(owner_id, encrypted_messages).await {
                    Ok(_) if done => {
                        let up_to = self.engine.top_bound(owner_id).await?;
                        Ok(vec![Frame::Ack { owner_id, up_to }])
                    }
                    Ok(_) => Ok(Vec::new()),
                    Err(RelayError::QuotaExceeded) => Ok(vec![Frame::Error { kind: ErrorKind::Quota, detail: "storage quota exceeded".into() }]),
                    Err(err) => Err(err),
                }
            }
            Frame::Ack { .. } => Ok(Vec::new()),
            Frame::Error { .. } => Ok(Vec::new()),
        }
    }
}

fn error_frame(err: RelayError) -> Frame {
    match err {
        RelayError::AuthMismatch => Frame::Error { kind: ErrorKind::Auth, detail: err.to_string() },
        RelayError::QuotaExceeded => Frame::Error { kind: ErrorKind::Quota, detail: err.to_string() },
        other => Frame::Error { kind: ErrorKind::FrameDecode, detail: other.to_string() },
    }
}
