// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronization session over one duplex byte stream.
//!
//! A session is symmetric: both ends run the same state machine, so any
//! two tables converge no matter which side opened the transport.
//!
//! # Lifecycle
//!
//! ```text
//!   Handshake ── remote digest received ──▶ Active ──▶ Closed
//!       │                                     │
//!       └──── finalize / EOF / error ─────────┘
//! ```
//!
//! 1. Send our digest (peer id plus per-peer replication cursors).
//! 2. Wait for the remote digest. Anything else arriving first is
//!    logged and ignored.
//! 3. Attach to the table and send catch-up bulks, one per origin peer
//!    the remote is behind on.
//! 4. Relay live changes in both directions until the stream ends, a
//!    finalize marker arrives, or the link stalls.
//!
//! # Stall Detection
//!
//! Both ends heartbeat every `ttl / 2`, so a healthy link always
//! carries inbound traffic. A full `ttl / 2` window with no inbound
//! message closes the session with [`TableError::Stalled`].

use crate::error::{Result, TableError};
use crate::metrics;
use crate::registry::{Relay, SinkId};
use crate::table::Table;
use crate::wire::{Change, Message, MessageCodec, PeerSeq};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Digest sent, waiting for the remote digest.
    Handshake,
    /// Digests exchanged; catch-up and live relay in progress.
    Active,
    /// Terminal. The sink is detached and the transport released.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Handshake => write!(f, "handshake"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Handle to a spawned session task.
///
/// Dropping the handle does not stop the session; use
/// [`finalize()`](Self::finalize) for a graceful close or destroy the
/// table to end every session at once.
pub struct SyncSession {
    state_rx: watch::Receiver<SessionState>,
    close_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<()>>,
}

impl SyncSession {
    pub(crate) fn spawn<T>(table: Table, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (state_tx, state_rx) = watch::channel(SessionState::Handshake);
        let (close_tx, close_rx) = watch::channel(false);
        let handle = tokio::spawn(run(table, io, state_tx, close_rx));
        SyncSession {
            state_rx,
            close_tx,
            handle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Request a graceful close: the session sends a finalize marker and
    /// ends without tearing down its table.
    pub fn finalize(&self) {
        let _ = self.close_tx.send(true);
    }

    /// Wait for the session task to end and return its outcome.
    pub async fn closed(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(TableError::Internal(format!(
                "session task failed: {err}"
            ))),
        }
    }

    /// Wait for the session to leave the given state.
    pub async fn state_changed_from(&mut self, state: SessionState) -> SessionState {
        loop {
            let current = *self.state_rx.borrow();
            if current != state {
                return current;
            }
            if self.state_rx.changed().await.is_err() {
                return *self.state_rx.borrow();
            }
        }
    }
}

async fn run<T>(
    table: Table,
    io: T,
    state_tx: watch::Sender<SessionState>,
    mut close_rx: watch::Receiver<bool>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = tokio_util::codec::Framed::new(io, MessageCodec::new());

    let cursors = table.digest();
    debug!(
        node_id = %table.id(),
        cursors = %format_digest(&cursors),
        "sending digest, awaiting remote digest"
    );
    framed
        .send(Message::Digest {
            id: table.id().to_string(),
            peers: cursors,
        })
        .await?;

    // Handshake: ignore everything until the remote digest arrives
    let (remote_id, remote_seqs) = loop {
        tokio::select! {
            msg = framed.next() => match msg {
                Some(Ok(Message::Digest { id, peers })) => break (id, peers),
                Some(Ok(Message::Finalize)) | None => {
                    debug!(node_id = %table.id(), "stream ended during handshake");
                    metrics::record_session_closed("handshake_eof");
                    let _ = state_tx.send(SessionState::Closed);
                    return Ok(());
                }
                Some(Ok(_)) => {
                    warn!(node_id = %table.id(), "non-digest message before handshake; ignoring");
                }
                Some(Err(err)) => {
                    metrics::record_session_closed("error");
                    let _ = state_tx.send(SessionState::Closed);
                    return Err(err);
                }
            },
            _ = close_rx.changed() => {
                if *close_rx.borrow() {
                    let _ = framed.send(Message::Finalize).await;
                    metrics::record_session_closed("finalized");
                    let _ = state_tx.send(SessionState::Closed);
                    return Ok(());
                }
            }
        }
    };

    info!(node_id = %table.id(), remote_id = %remote_id, "session active");
    metrics::record_session_established();
    let _ = state_tx.send(SessionState::Active);

    let (sid, mut relay_rx, batches) = table.attach_session(&remote_seqs);
    let result = relay_loop(
        &table,
        &mut framed,
        &remote_id,
        sid,
        &mut relay_rx,
        batches,
        &mut close_rx,
    )
    .await;

    table.detach(sid);
    let _ = framed.close().await;
    let _ = state_tx.send(SessionState::Closed);
    debug!(node_id = %table.id(), remote_id = %remote_id, "session closed");
    result
}

async fn relay_loop<T>(
    table: &Table,
    framed: &mut tokio_util::codec::Framed<T, MessageCodec>,
    remote_id: &str,
    sid: SinkId,
    relay_rx: &mut mpsc::UnboundedReceiver<Relay>,
    batches: Vec<Vec<Change>>,
    close_rx: &mut watch::Receiver<bool>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    // Catch-up strictly precedes live relay on this link; the sink was
    // attached under the same lock that snapshotted these batches, so
    // nothing is lost or duplicated in between.
    for changes in batches {
        metrics::record_catchup_batch(changes.len());
        if let Err(err) = framed.send(Message::Bulk { changes }).await {
            metrics::record_session_closed("error");
            return Err(err);
        }
    }

    let window = stall_window(table.ttl());
    let start = tokio::time::Instant::now() + window;
    let mut ticker = tokio::time::interval_at(start, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut alive = true;

    loop {
        tokio::select! {
            msg = framed.next() => match msg {
                Some(Ok(Message::Bulk { changes })) => {
                    alive = true;
                    let applied = table.apply_batch_from(Some(sid), &changes);
                    debug!(
                        remote_id = %remote_id,
                        received = changes.len(),
                        applied,
                        "bulk merged"
                    );
                }
                Some(Ok(Message::Change(change))) => {
                    alive = true;
                    table.apply_from(Some(sid), &change);
                }
                Some(Ok(Message::Digest { id, .. })) => {
                    alive = true;
                    warn!(remote_id = %id, "duplicate digest ignored");
                }
                Some(Ok(Message::Finalize)) => {
                    debug!(remote_id = %remote_id, "remote finalized");
                    metrics::record_session_closed("finalized");
                    return Ok(());
                }
                None => {
                    debug!(remote_id = %remote_id, "stream ended");
                    metrics::record_session_closed("eof");
                    return Ok(());
                }
                Some(Err(err)) => {
                    metrics::record_session_closed("error");
                    return Err(err);
                }
            },
            relay = relay_rx.recv() => match relay {
                Some(Relay::Change(change)) => {
                    if let Err(err) = framed.send(Message::Change(change)).await {
                        metrics::record_session_closed("error");
                        return Err(err);
                    }
                }
                Some(Relay::Finalize) | None => {
                    let _ = framed.send(Message::Finalize).await;
                    metrics::record_session_closed("finalized");
                    return Ok(());
                }
            },
            _ = close_rx.changed() => {
                if *close_rx.borrow() {
                    let _ = framed.send(Message::Finalize).await;
                    metrics::record_session_closed("finalized");
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                if !alive {
                    warn!(
                        remote_id = %remote_id,
                        window_ms = window.as_millis() as u64,
                        "no inbound traffic; closing stalled session"
                    );
                    metrics::record_session_closed("stalled");
                    return Err(TableError::Stalled(window.as_millis() as u64));
                }
                alive = false;
            }
        }
    }
}

/// Inbound-silence window before a session is declared stalled.
///
/// Half the TTL, matching the heartbeat period: a healthy remote always
/// produces at least one message per window.
fn stall_window(ttl: Duration) -> Duration {
    (ttl / 2).max(Duration::from_millis(1))
}

/// Pretty-printer for digests in debug logs.
fn format_digest(peers: &[PeerSeq]) -> String {
    peers
        .iter()
        .map(|p| format!("{}:{}", p.id, p.seq))
        .collect::<Vec<_>>()
        .join(",")
}
