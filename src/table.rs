// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replicated table.
//!
//! A [`Table`] owns the full set of [`PeerState`] records (its own
//! included), applies local mutations, merges remote changes, fans merged
//! changes out to attached sessions, and runs the local heartbeat clock.
//!
//! # Merge Entry Point
//!
//! Sessions never mutate peer state directly: every change, local or
//! remote, funnels through the table's merge path, which holds the peer
//! lock across both the merge and the fan-out. That single critical
//! section is what guarantees per-origin-peer changes reach every link in
//! non-decreasing `seq` order. Merge and fan-out are in-memory and
//! non-blocking (unbounded channels), so the lock is never held across
//! I/O.
//!
//! # Liveness
//!
//! A non-local peer is visible to [`list()`](Table::list) /
//! [`keys()`](Table::keys) only while its last applied change is younger
//! than one TTL; the local peer is always visible. Expiry is a read-time
//! filter — the record itself survives, so a late heartbeat revives the
//! peer without resynchronization. [`has()`](Table::has) is an existence
//! check over all known peers and deliberately ignores TTL.
//!
//! # Example
//!
//! ```rust,no_run
//! use meshtable::{Table, TableConfig};
//!
//! # async fn example() -> meshtable::Result<()> {
//! let table = Table::new(TableConfig::default());
//! table.push("hosts", b"10.0.0.1:9000")?;
//! assert!(table.has("hosts"));
//!
//! // Attach a session over any duplex byte stream
//! # let socket = tokio::io::duplex(1024).0;
//! let session = table.sync(socket);
//! # Ok(())
//! # }
//! ```

use crate::config::TableConfig;
use crate::error::{Result, TableError};
use crate::metrics;
use crate::peer::PeerState;
use crate::registry::{Relay, SinkId, SinkRegistry};
use crate::session::SyncSession;
use crate::wire::{Change, ChangeOp, PeerSeq};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Capacity of the "key updated" broadcast channel. A subscriber that
/// lags behind this many notifications observes a `Lagged` gap.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A peer-to-peer replicated key→multivalue table.
///
/// Cheap to clone (shared handle). Must be created inside a Tokio
/// runtime: construction spawns the local heartbeat clock.
#[derive(Clone)]
pub struct Table {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    ttl: Duration,
    peers: Mutex<HashMap<String, PeerState>>,
    sinks: SinkRegistry,
    update_tx: broadcast::Sender<String>,
    destroyed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Table {
    /// Create a table and start its heartbeat clock (period `ttl / 2`).
    ///
    /// Generates a UUID peer id when the config does not supply one.
    pub fn new(config: TableConfig) -> Self {
        let id = config
            .node_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ttl = config.ttl();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let mut peers = HashMap::new();
        peers.insert(id.clone(), PeerState::new(&id));

        let inner = Arc::new(Inner {
            id,
            ttl,
            peers: Mutex::new(peers),
            sinks: SinkRegistry::new(),
            update_tx,
            destroyed: AtomicBool::new(false),
            shutdown_tx,
        });

        spawn_heartbeat_clock(
            Arc::downgrade(&inner),
            config.heartbeat_interval(),
            shutdown_rx,
        );

        info!(
            node_id = %inner.id,
            ttl_ms = ttl.as_millis() as u64,
            "table created"
        );

        Table { inner }
    }

    /// The local peer id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The configured staleness threshold.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Check whether [`destroy()`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Local mutation
    // =========================================================================

    /// Add `value` to the local peer's set for `key` and gossip it out.
    pub fn push(&self, key: &str, value: &[u8]) -> Result<()> {
        self.local_change(ChangeOp::Push, Some(key), Some(value))
    }

    /// Remove `value` from the local peer's set for `key` and gossip it out.
    pub fn pull(&self, key: &str, value: &[u8]) -> Result<()> {
        self.local_change(ChangeOp::Pull, Some(key), Some(value))
    }

    /// Emit a local liveness signal.
    ///
    /// Driven automatically by the heartbeat clock; exposed for callers
    /// that manage their own timing.
    pub fn heartbeat(&self) -> Result<()> {
        metrics::record_heartbeat();
        self.local_change(ChangeOp::Heartbeat, None, None)
    }

    fn local_change(&self, op: ChangeOp, key: Option<&str>, value: Option<&[u8]>) -> Result<()> {
        if self.is_destroyed() {
            return Err(TableError::Destroyed);
        }

        let notify_key = {
            let mut peers = self.lock_peers();
            let local = peers
                .get_mut(&self.inner.id)
                .ok_or_else(|| TableError::Internal("local peer record missing".to_string()))?;
            let change = Change {
                op,
                peer: self.inner.id.clone(),
                seq: local.seq() + 1,
                timestamp: epoch_millis(),
                key: key.map(str::to_string),
                value: value.map(<[u8]>::to_vec),
            };
            let accepted = self.merge_locked(&mut peers, None, &change);
            debug_assert!(accepted, "locally issued change must always apply");
            change.key
        };

        if let Some(key) = notify_key {
            self.notify_update(&key);
        }
        Ok(())
    }

    // =========================================================================
    // Merge path (sessions and log-tail writers funnel through here)
    // =========================================================================

    /// Merge one change attributed to an originating sink.
    ///
    /// Returns whether the change was applied. Fan-out skips the origin
    /// so a change never echoes back over the session it arrived on.
    pub(crate) fn apply_from(&self, origin: Option<SinkId>, change: &Change) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let accepted = {
            let mut peers = self.lock_peers();
            self.merge_locked(&mut peers, origin, change)
        };
        if accepted {
            if let Some(key) = &change.key {
                self.notify_update(key);
            }
        }
        accepted
    }

    /// Merge a batch of changes, coalescing update notifications to at
    /// most one per distinct key. Returns the number of applied changes.
    pub(crate) fn apply_batch_from(&self, origin: Option<SinkId>, changes: &[Change]) -> usize {
        if self.is_destroyed() {
            return 0;
        }

        let mut touched: Vec<String> = Vec::new();
        let mut applied = 0;
        {
            let mut peers = self.lock_peers();
            for change in changes {
                if !self.merge_locked(&mut peers, origin, change) {
                    continue;
                }
                applied += 1;
                if let Some(key) = &change.key {
                    if !touched.iter().any(|k| k == key) {
                        touched.push(key.clone());
                    }
                }
            }
        }

        for key in &touched {
            self.notify_update(key);
        }
        applied
    }

    /// Merge a single externally sourced change (log-tail write side).
    pub fn ingest(&self, change: &Change) -> bool {
        self.apply_from(None, change)
    }

    /// Merge an externally sourced batch (log-tail write side), with the
    /// same per-key notification coalescing as session bulks.
    pub fn ingest_batch(&self, changes: &[Change]) -> usize {
        self.apply_batch_from(None, changes)
    }

    /// Merge under an already-held peer lock and fan out on success.
    ///
    /// Fan-out happens inside the critical section: per-origin-peer seq
    /// order observed here is therefore the order every attached sink
    /// observes.
    fn merge_locked(
        &self,
        peers: &mut HashMap<String, PeerState>,
        origin: Option<SinkId>,
        change: &Change,
    ) -> bool {
        let known = peers.len();
        peers
            .entry(change.peer.clone())
            .or_insert_with(|| PeerState::new(&change.peer));
        if peers.len() != known {
            metrics::set_known_peers(peers.len());
        }

        let state = peers
            .get_mut(&change.peer)
            .expect("peer record just ensured");
        if !state.apply(change) {
            trace!(
                origin_peer = %change.peer,
                seq = change.seq,
                op = %change.op,
                "change rejected"
            );
            metrics::record_change_rejected(&change.op.to_string());
            return false;
        }

        trace!(
            origin_peer = %change.peer,
            seq = change.seq,
            op = %change.op,
            "change applied"
        );
        metrics::record_change_applied(&change.op.to_string());
        self.inner.sinks.relay(origin, change);
        true
    }

    fn notify_update(&self, key: &str) {
        metrics::record_update_notification();
        // No subscribers is fine
        let _ = self.inner.update_tx.send(key.to_string());
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The union of `key`'s values across all live peers.
    ///
    /// Returns `None` when no live peer knows the key — distinguishable
    /// from "known but empty", which cannot persist because a key whose
    /// set empties is deleted.
    pub fn list(&self, key: &str) -> Option<Vec<Vec<u8>>> {
        let peers = self.lock_peers();
        let now = epoch_millis();
        let ttl_ms = self.inner.ttl.as_millis() as u64;

        let mut union: Option<HashSet<Vec<u8>>> = None;
        for peer in peers.values() {
            if peer.id() != self.inner.id && !peer.is_fresh(now, ttl_ms) {
                continue;
            }
            if let Some(values) = peer.list(key) {
                union
                    .get_or_insert_with(HashSet::new)
                    .extend(values.iter().cloned());
            }
        }

        union.map(|set| set.into_iter().collect())
    }

    /// The union of all keys present in any live peer's values.
    pub fn keys(&self) -> Vec<String> {
        let peers = self.lock_peers();
        let now = epoch_millis();
        let ttl_ms = self.inner.ttl.as_millis() as u64;

        let mut keys: HashSet<&str> = HashSet::new();
        for peer in peers.values() {
            if peer.id() != self.inner.id && !peer.is_fresh(now, ttl_ms) {
                continue;
            }
            keys.extend(peer.keys());
        }
        keys.into_iter().map(str::to_string).collect()
    }

    /// Check if any known peer — live or not — has a non-empty set for
    /// `key`. Membership existence deliberately ignores TTL.
    pub fn has(&self, key: &str) -> bool {
        self.lock_peers().values().any(|p| p.has(key))
    }

    /// Number of known peers, expired and tombstoned ones included.
    pub fn known_peers(&self) -> usize {
        self.lock_peers().len()
    }

    /// Number of currently attached sinks (sessions and log tails).
    pub fn sink_count(&self) -> usize {
        self.inner.sinks.len()
    }

    /// Subscribe to "key updated" notifications.
    ///
    /// Fired at most once per merged batch per distinct key. A slow
    /// subscriber may observe a `Lagged` gap rather than stalling the
    /// table.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.update_tx.subscribe()
    }

    // =========================================================================
    // Sessions and log tailing
    // =========================================================================

    /// Attach a synchronization session over a duplex byte stream.
    ///
    /// The session task handshakes, transfers catch-up state, then
    /// relays live changes in both directions until the stream closes,
    /// the link stalls for a TTL/2 window, or the session is finalized.
    pub fn sync<T>(&self, io: T) -> SyncSession
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        SyncSession::spawn(self.clone(), io)
    }

    /// Snapshot of the per-peer replication cursors, as exchanged in
    /// session digests.
    pub fn digest(&self) -> Vec<PeerSeq> {
        self.lock_peers()
            .values()
            .map(|p| PeerSeq {
                id: p.id().to_string(),
                seq: p.seq(),
            })
            .collect()
    }

    /// Register a session sink and snapshot its catch-up batches.
    ///
    /// Registration and snapshot happen under one peer lock so every
    /// change lands exactly once per link: in the snapshot if it merged
    /// before attach, in the relay channel if after.
    pub(crate) fn attach_session(
        &self,
        remote: &[PeerSeq],
    ) -> (SinkId, mpsc::UnboundedReceiver<Relay>, Vec<Vec<Change>>) {
        let remote_seqs: HashMap<&str, u64> =
            remote.iter().map(|p| (p.id.as_str(), p.seq)).collect();

        let peers = self.lock_peers();
        let (id, rx) = self.inner.sinks.attach();
        let batches = peers
            .values()
            .map(|peer| peer.log_after(remote_seqs.get(peer.id()).copied().unwrap_or(0)))
            .filter(|batch| !batch.is_empty())
            .collect();
        (id, rx, batches)
    }

    /// Remove a detached sink from fan-out.
    pub(crate) fn detach(&self, id: SinkId) {
        self.inner.sinks.detach(id);
    }

    /// Open a log-tail read stream.
    ///
    /// Replays every already-applied change retained in any peer's log,
    /// then stays open for live appends. Restartable from scratch only:
    /// a new call always replays from the beginning.
    pub fn log_stream(&self) -> LogStream {
        let peers = self.lock_peers();
        let (id, tx, rx) = self.inner.sinks.attach_with_sender();
        for peer in peers.values() {
            for change in peer.log() {
                // Receiver is held locally; this cannot fail yet
                let _ = tx.send(Relay::Change(change.clone()));
            }
        }
        drop(peers);

        LogStream {
            id,
            table: self.clone(),
            rx,
            done: false,
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroy the table: stop the heartbeat clock, emit one local QUIT,
    /// and finalize every attached sink. Idempotent.
    ///
    /// The QUIT is fanned out before the finalize markers, so every
    /// remote learns of the tombstone before its link ends.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            debug!(node_id = %self.inner.id, "destroy called twice; ignoring");
            return;
        }

        info!(node_id = %self.inner.id, "destroying table");
        let _ = self.inner.shutdown_tx.send(true);

        {
            let mut peers = self.lock_peers();
            let seq = peers
                .get(&self.inner.id)
                .map(|local| local.seq() + 1)
                .unwrap_or(1);
            let quit = Change::quit(&self.inner.id, seq, epoch_millis());
            self.merge_locked(&mut peers, None, &quit);
        }

        self.inner.sinks.finalize_all();
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, HashMap<String, PeerState>> {
        self.inner.peers.lock().expect("peer map poisoned")
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.inner.id)
            .field("ttl", &self.inner.ttl)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Log-tail read stream: full replay followed by live appends.
///
/// Ends (yields `None`) when the table is destroyed. Detaches from the
/// table on drop.
pub struct LogStream {
    id: SinkId,
    table: Table,
    rx: mpsc::UnboundedReceiver<Relay>,
    done: bool,
}

impl LogStream {
    /// Receive the next change, awaiting live appends after the replay
    /// is exhausted. Returns `None` once the table is destroyed.
    pub async fn recv(&mut self) -> Option<Change> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Relay::Change(change)) => Some(change),
            Some(Relay::Finalize) | None => {
                self.done = true;
                None
            }
        }
    }

    /// Receive the next already-buffered change without waiting.
    pub fn try_recv(&mut self) -> Option<Change> {
        if self.done {
            return None;
        }
        match self.rx.try_recv() {
            Ok(Relay::Change(change)) => Some(change),
            Ok(Relay::Finalize) => {
                self.done = true;
                None
            }
            Err(_) => None,
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.table.detach(self.id);
    }
}

/// Spawn the local heartbeat clock.
///
/// Holds only a weak handle: the clock never keeps a dropped table
/// alive, and it stops on the destroy signal.
fn spawn_heartbeat_clock(
    inner: Weak<Inner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    let table = Table { inner };
                    if table.heartbeat().is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("heartbeat clock stopping");
                        break;
                    }
                }
            }
        }
    });
}

/// Current epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: &str, ttl: Duration) -> Table {
        Table::new(TableConfig::for_testing(id, ttl))
    }

    fn sorted(values: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut values = values;
        values.sort();
        values
    }

    #[tokio::test]
    async fn test_push_list_pull() {
        let t = table("p1", Duration::from_secs(10));

        t.push("hello", b"world").unwrap();
        assert_eq!(t.keys(), vec!["hello".to_string()]);
        assert_eq!(t.list("hello").unwrap(), vec![b"world".to_vec()]);

        t.pull("hello", b"world").unwrap();
        assert!(t.keys().is_empty());
        // Unknown key is absent, not empty
        assert!(t.list("hello").is_none());
    }

    #[tokio::test]
    async fn test_list_unions_multiple_values() {
        let t = table("p1", Duration::from_secs(10));
        t.push("hello", b"world").unwrap();
        t.push("hello", b"welt").unwrap();

        assert_eq!(
            sorted(t.list("hello").unwrap()),
            vec![b"welt".to_vec(), b"world".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_local_peer_ignores_ttl() {
        let t = table("p1", Duration::from_millis(10));
        t.push("hello", b"world").unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Local contributions never expire
        assert!(t.list("hello").is_some());
    }

    #[tokio::test]
    async fn test_remote_peer_expires_and_revives() {
        let t = table("p1", Duration::from_millis(100));

        assert!(t.ingest(&Change::push("p2", 1, epoch_millis(), "hello", b"welt")));
        assert!(t.list("hello").is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Expired from list, but the record survives
        assert!(t.list("hello").is_none());
        assert_eq!(t.known_peers(), 2);

        // A fresh heartbeat revives visibility without resync
        assert!(t.ingest(&Change::heartbeat("p2", 2, epoch_millis())));
        assert_eq!(t.list("hello").unwrap(), vec![b"welt".to_vec()]);
    }

    #[tokio::test]
    async fn test_has_ignores_ttl() {
        let t = table("p1", Duration::from_millis(50));
        t.ingest(&Change::push("p2", 1, epoch_millis(), "hello", b"welt"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(t.list("hello").is_none());
        assert!(t.has("hello"));
    }

    #[tokio::test]
    async fn test_stale_ingest_rejected() {
        let t = table("p1", Duration::from_secs(10));
        assert!(t.ingest(&Change::push("p2", 5, 100, "a", b"x")));
        assert!(!t.ingest(&Change::push("p2", 5, 100, "a", b"x")));
        assert!(!t.ingest(&Change::push("p2", 3, 100, "b", b"y")));
        assert!(!t.has("b"));
    }

    #[tokio::test]
    async fn test_quit_tombstones_remote_peer() {
        let t = table("p1", Duration::from_secs(10));
        t.ingest(&Change::push("p2", 1, epoch_millis(), "hello", b"welt"));
        assert!(t.has("hello"));

        t.ingest(&Change::quit("p2", 2, epoch_millis()));
        assert!(!t.has("hello"));
        assert!(t.list("hello").is_none());
        // The peer id stays known for sequence checks
        assert_eq!(t.known_peers(), 2);
        assert!(!t.ingest(&Change::push("p2", 1, epoch_millis(), "hello", b"welt")));
    }

    #[tokio::test]
    async fn test_update_notifications_coalesced_per_batch() {
        let t = table("p1", Duration::from_secs(10));
        let mut updates = t.subscribe();

        let now = epoch_millis();
        let applied = t.ingest_batch(&[
            Change::push("p2", 1, now, "hello", b"a"),
            Change::push("p2", 2, now, "hello", b"b"),
            Change::push("p2", 3, now, "other", b"c"),
            // Stale: must not notify
            Change::push("p2", 1, now, "hello", b"d"),
        ]);
        assert_eq!(applied, 3);

        assert_eq!(updates.recv().await.unwrap(), "hello");
        assert_eq!(updates.recv().await.unwrap(), "other");
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_clock_advances_local_seq() {
        let t = table("p1", Duration::from_millis(40));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let digest = t.digest();
        let local = digest.iter().find(|p| p.id == "p1").unwrap();
        assert!(local.seq >= 2, "heartbeats should have fired, seq = {}", local.seq);
    }

    #[tokio::test]
    async fn test_destroy_rejects_further_mutation() {
        let t = table("p1", Duration::from_secs(10));
        t.push("hello", b"world").unwrap();

        t.destroy();
        assert!(t.is_destroyed());
        assert!(matches!(t.push("x", b"y"), Err(TableError::Destroyed)));
        assert!(matches!(t.heartbeat(), Err(TableError::Destroyed)));
        assert!(!t.ingest(&Change::push("p2", 1, epoch_millis(), "a", b"b")));

        // Local state is tombstoned
        assert!(t.list("hello").is_none());
    }

    #[tokio::test]
    async fn test_double_destroy_is_noop() {
        let t = table("p1", Duration::from_secs(10));
        t.destroy();
        t.destroy();
        assert!(t.is_destroyed());
    }

    #[tokio::test]
    async fn test_log_stream_replays_then_tails() {
        let t = table("p1", Duration::from_secs(10));
        t.push("a", b"1").unwrap();
        t.push("b", b"2").unwrap();

        let mut log = t.log_stream();
        assert_eq!(log.recv().await.unwrap().key.as_deref(), Some("a"));
        assert_eq!(log.recv().await.unwrap().key.as_deref(), Some("b"));
        assert!(log.try_recv().is_none());

        // Live append after the replay
        t.push("c", b"3").unwrap();
        assert_eq!(log.recv().await.unwrap().key.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_log_stream_ends_on_destroy() {
        let t = table("p1", Duration::from_secs(10));
        t.push("a", b"1").unwrap();

        let mut log = t.log_stream();
        assert!(log.recv().await.is_some());

        t.destroy();
        // The destroy QUIT is relayed before the finalize marker
        let quit = log.recv().await.unwrap();
        assert_eq!(quit.op, ChangeOp::Quit);
        assert!(log.recv().await.is_none());
        // Terminal state is sticky
        assert!(log.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_log_stream_detaches_on_drop() {
        let t = table("p1", Duration::from_secs(10));
        {
            let _log = t.log_stream();
            assert_eq!(t.sink_count(), 1);
        }
        assert_eq!(t.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_batch_from_log_stream_replicates() {
        // write sink + read source round trip between two tables
        let src = table("p1", Duration::from_secs(10));
        src.push("hello", b"world").unwrap();
        src.push("hello", b"welt").unwrap();

        let mut log = src.log_stream();
        let mut batch = Vec::new();
        while let Some(change) = log.try_recv() {
            batch.push(change);
        }

        let dst = table("p2", Duration::from_secs(10));
        assert_eq!(dst.ingest_batch(&batch), 2);
        assert_eq!(
            sorted(dst.list("hello").unwrap()),
            vec![b"welt".to_vec(), b"world".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_digest_covers_all_known_peers() {
        let t = table("p1", Duration::from_secs(10));
        t.push("k", b"v").unwrap();
        t.ingest(&Change::push("p2", 4, epoch_millis(), "k", b"w"));

        let mut digest = t.digest();
        digest.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(digest.len(), 2);
        assert_eq!(digest[0].id, "p1");
        assert_eq!(digest[0].seq, 1);
        assert_eq!(digest[1].id, "p2");
        assert_eq!(digest[1].seq, 4);
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let a = Table::new(TableConfig::default());
        let b = Table::new(TableConfig::default());
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_empty());
    }
}
