//! Per-peer replicated state and the merge rule.
//!
//! A [`PeerState`] holds everything one peer has contributed to the table:
//! its key→value-set mapping, the ordered log of applied changes, and its
//! replication cursor (`seq`). Only the origin peer assigns its own
//! sequence numbers, so the merge rule never has to resolve true
//! conflicts: a change is either new (applied) or stale (rejected).
//!
//! # Merge Rule
//!
//! [`PeerState::apply()`] is idempotent and safe against re-delivery:
//!
//! - `seq <= current` → rejected, no side effect (duplicate or stale).
//! - Unrecognized op code → rejected the same way (forward compatibility).
//! - PUSH adds to the key's set, PULL removes from it (dropping the key
//!   when the set empties), HEARTBEAT only refreshes `updated`, QUIT
//!   tombstones the whole record.
//!
//! Cross-peer writes never conflict: each peer owns only its own
//! contribution, and reads union the live peers' sets.
//!
//! # Log
//!
//! The log retains PUSH/PULL/QUIT changes in application order and is used
//! to answer "what have I seen past seq N" during session catch-up and to
//! rehydrate log-tail consumers. Heartbeats are never retained: a trailing
//! heartbeat marker (possible when a batch from an external writer is
//! ingested) is popped before the next real change is appended.

use crate::wire::{Change, ChangeOp};
use std::collections::{HashMap, HashSet};

/// Sentinel for "never updated" (also set by QUIT's tombstone).
pub const NEVER: u64 = 0;

/// One peer's replicated facts and replication cursor.
#[derive(Debug, Clone, Default)]
pub struct PeerState {
    /// Peer id (origin of every change applied here).
    id: String,
    /// Last applied sequence number.
    seq: u64,
    /// Timestamp (epoch ms) of the last applied change; `NEVER` if none
    /// or tombstoned.
    updated: u64,
    /// key → set of contributed values.
    values: HashMap<String, HashSet<Vec<u8>>>,
    /// Applied PUSH/PULL/QUIT changes, in order. A QUIT clears
    /// everything before it and becomes the sole entry.
    log: Vec<Change>,
}

impl PeerState {
    /// Create an empty record for a newly discovered peer.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last applied sequence number (the replication cursor).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Timestamp of the last applied change, or [`NEVER`].
    pub fn updated(&self) -> u64 {
        self.updated
    }

    /// Check whether this peer counts as live at `now` for the given TTL.
    ///
    /// The local peer is authoritative for itself; callers must not gate
    /// it on this check.
    pub fn is_fresh(&self, now: u64, ttl_ms: u64) -> bool {
        self.updated != NEVER && self.updated.saturating_add(ttl_ms) >= now
    }

    /// Check if this peer contributes a non-empty set for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// This peer's value set for `key`, if any.
    pub fn list(&self, key: &str) -> Option<&HashSet<Vec<u8>>> {
        self.values.get(key)
    }

    /// Keys this peer currently contributes to.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Applied changes retained for catch-up and log tailing.
    pub fn log(&self) -> &[Change] {
        &self.log
    }

    /// Log entries newer than a remote cursor.
    pub fn log_after(&self, seq: u64) -> Vec<Change> {
        self.log.iter().filter(|c| c.seq > seq).cloned().collect()
    }

    /// Merge one change into this record.
    ///
    /// Returns `true` if the change mutated state (and was recorded),
    /// `false` if it was rejected as stale, duplicate, unrecognized, or
    /// malformed. Rejection has no side effect of any kind.
    pub fn apply(&mut self, change: &Change) -> bool {
        if change.seq <= self.seq {
            return false;
        }

        match change.op {
            ChangeOp::Push | ChangeOp::Pull => {
                // A push/pull without key+value is malformed; treat it
                // like an unrecognized op and leave the cursor alone.
                let (key, value) = match (&change.key, &change.value) {
                    (Some(key), Some(value)) => (key, value),
                    _ => return false,
                };
                self.seq = change.seq;
                self.updated = change.timestamp;
                if change.op == ChangeOp::Push {
                    self.values
                        .entry(key.clone())
                        .or_default()
                        .insert(value.clone());
                } else if let Some(set) = self.values.get_mut(key) {
                    set.remove(value);
                    if set.is_empty() {
                        self.values.remove(key);
                    }
                }
                self.append_log(change);
            }
            ChangeOp::Heartbeat => {
                self.seq = change.seq;
                self.updated = change.timestamp;
            }
            ChangeOp::Quit => {
                self.seq = change.seq;
                self.values.clear();
                self.log.clear();
                self.updated = NEVER;
                // The tombstone itself must survive in the log so a
                // catch-up batch can carry it to peers that were
                // offline when it happened.
                self.append_log(change);
            }
            ChangeOp::Other(_) => return false,
        }

        true
    }

    fn append_log(&mut self, change: &Change) {
        if self
            .log
            .last()
            .is_some_and(|c| c.op == ChangeOp::Heartbeat)
        {
            self.log.pop();
        }
        self.log.push(change.clone());
    }
}
