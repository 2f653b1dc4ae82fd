// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire-visible types and the session codec.
//!
//! A session carries four logical message kinds over any duplex byte
//! stream, framed with a u32 length prefix and encoded with bincode:
//!
//! - [`Message::Digest`] — sent exactly once per direction, first. Carries
//!   the sender's id and its replication cursor (`{id, seq}`) for every
//!   peer it knows about.
//! - [`Message::Bulk`] — zero or more catch-up batches.
//! - [`Message::Change`] — individual live updates.
//! - [`Message::Finalize`] — final marker sent on explicit teardown so the
//!   remote can release its side without waiting for a transport close.
//!
//! # Forward Compatibility
//!
//! Op codes are a small closed enum on the wire (`PUSH=1`, `PULL=2`,
//! `HEARTBEAT=3`, `QUIT=4`), but unknown codes from future writers must
//! never crash a peer. [`ChangeOp`] therefore decodes any byte, parking
//! unrecognized values in [`ChangeOp::Other`]; the merge rule rejects them
//! as no-ops.

use crate::error::TableError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Maximum frame length accepted by the codec (8 MiB).
/// Bounds memory per connection; a bulk batch larger than this is a bug.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Replicated mutation kind.
///
/// `Other` holds an unrecognized wire code; it decodes cleanly and is
/// rejected by the merge rule without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    /// Add a value to a key's set.
    Push,
    /// Remove a value from a key's set.
    Pull,
    /// Liveness signal; refreshes the origin peer's freshness only.
    Heartbeat,
    /// Tombstone: clears the origin peer's contributed state.
    Quit,
    /// Unrecognized op code from a future writer.
    Other(u8),
}

impl ChangeOp {
    /// Numeric wire code for this op.
    pub fn code(self) -> u8 {
        match self {
            ChangeOp::Push => 1,
            ChangeOp::Pull => 2,
            ChangeOp::Heartbeat => 3,
            ChangeOp::Quit => 4,
            ChangeOp::Other(code) => code,
        }
    }

    /// Map a wire code back to an op. Unknown codes become `Other`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ChangeOp::Push,
            2 => ChangeOp::Pull,
            3 => ChangeOp::Heartbeat,
            4 => ChangeOp::Quit,
            other => ChangeOp::Other(other),
        }
    }

    /// Check if this op is one the merge rule understands.
    pub fn is_recognized(self) -> bool {
        !matches!(self, ChangeOp::Other(_))
    }
}

impl Serialize for ChangeOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ChangeOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ChangeOp::from_code(u8::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOp::Push => write!(f, "push"),
            ChangeOp::Pull => write!(f, "pull"),
            ChangeOp::Heartbeat => write!(f, "heartbeat"),
            ChangeOp::Quit => write!(f, "quit"),
            ChangeOp::Other(code) => write!(f, "other({})", code),
        }
    }
}

/// One replicated mutation record, the atomic unit of gossip.
///
/// `seq` is a strictly increasing counter assigned only by the origin
/// peer; `timestamp` is the origin's wall clock in epoch milliseconds.
/// `key`/`value` are absent for HEARTBEAT and QUIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub op: ChangeOp,
    /// Origin peer id.
    pub peer: String,
    pub seq: u64,
    pub timestamp: u64,
    pub key: Option<String>,
    pub value: Option<Vec<u8>>,
}

impl Change {
    /// Build a PUSH change.
    pub fn push(peer: &str, seq: u64, timestamp: u64, key: &str, value: &[u8]) -> Self {
        Self {
            op: ChangeOp::Push,
            peer: peer.to_string(),
            seq,
            timestamp,
            key: Some(key.to_string()),
            value: Some(value.to_vec()),
        }
    }

    /// Build a PULL change.
    pub fn pull(peer: &str, seq: u64, timestamp: u64, key: &str, value: &[u8]) -> Self {
        Self {
            op: ChangeOp::Pull,
            peer: peer.to_string(),
            seq,
            timestamp,
            key: Some(key.to_string()),
            value: Some(value.to_vec()),
        }
    }

    /// Build a HEARTBEAT change (no key/value).
    pub fn heartbeat(peer: &str, seq: u64, timestamp: u64) -> Self {
        Self {
            op: ChangeOp::Heartbeat,
            peer: peer.to_string(),
            seq,
            timestamp,
            key: None,
            value: None,
        }
    }

    /// Build a QUIT change (no key/value).
    pub fn quit(peer: &str, seq: u64, timestamp: u64) -> Self {
        Self {
            op: ChangeOp::Quit,
            peer: peer.to_string(),
            seq,
            timestamp,
            key: None,
            value: None,
        }
    }
}

/// Per-peer replication cursor, exchanged in digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSeq {
    pub id: String,
    pub seq: u64,
}

/// A framed session message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Sequence-number summary, sent exactly once per direction, first.
    Digest { id: String, peers: Vec<PeerSeq> },
    /// Catch-up batch; may also carry batched live relay.
    Bulk { changes: Vec<Change> },
    /// Individual live update.
    Change(Change),
    /// Final marker: the sender is done and will close its side.
    Finalize,
}

/// Session codec: length-delimited frames carrying bincode messages.
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = TableError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, TableError> {
        let frame = match self.inner.decode(src)? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        bincode::deserialize(&frame)
            .map(Some)
            .map_err(|e| TableError::Codec(format!("failed to decode message: {}", e)))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = TableError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), TableError> {
        let payload = bincode::serialize(&msg)
            .map_err(|e| TableError::Codec(format!("failed to encode message: {}", e)))?;
        self.inner.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}
