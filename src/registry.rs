// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attached-sink bookkeeping and change fan-out.
//!
//! Every consumer of merged changes — a sync session or a log-tail
//! reader — registers here and receives its own unbounded channel.
//! Fan-out is fire-and-forget: a slow consumer buffers in its channel
//! and can never stall the table. Sinks are keyed by a stable id so
//! insert/remove is deterministic; the id doubles as the origin marker
//! that keeps a change from echoing back over the session it arrived on.

use crate::metrics;
use crate::wire::Change;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Stable identifier for one attached sink.
pub(crate) type SinkId = u64;

/// One fan-out event delivered to a sink.
#[derive(Debug, Clone)]
pub(crate) enum Relay {
    /// A change merged into the table (local or remote origin).
    Change(Change),
    /// The table is tearing this sink down; flush and close.
    Finalize,
}

/// Registry of currently attached sinks.
#[derive(Debug, Default)]
pub(crate) struct SinkRegistry {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<SinkId, mpsc::UnboundedSender<Relay>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new sink, returning its id and event receiver.
    pub fn attach(&self) -> (SinkId, mpsc::UnboundedReceiver<Relay>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sinks = self.sinks.lock().expect("sink registry poisoned");
        sinks.insert(id, tx);
        metrics::set_attached_sinks(sinks.len());
        (id, rx)
    }

    /// Attach a new sink, also handing back the sender so the caller
    /// can seed the channel with replayed events before any fan-out
    /// it observes.
    pub fn attach_with_sender(
        &self,
    ) -> (
        SinkId,
        mpsc::UnboundedSender<Relay>,
        mpsc::UnboundedReceiver<Relay>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sinks = self.sinks.lock().expect("sink registry poisoned");
        sinks.insert(id, tx.clone());
        metrics::set_attached_sinks(sinks.len());
        (id, tx, rx)
    }

    /// Remove a sink. Safe to call for an already-removed id.
    pub fn detach(&self, id: SinkId) {
        let mut sinks = self.sinks.lock().expect("sink registry poisoned");
        sinks.remove(&id);
        metrics::set_attached_sinks(sinks.len());
    }

    /// Fan a merged change out to every sink except its origin.
    ///
    /// Send failures (a sink whose receiver is already gone) are ignored;
    /// the owning task detaches itself on exit.
    pub fn relay(&self, origin: Option<SinkId>, change: &Change) {
        let sinks = self.sinks.lock().expect("sink registry poisoned");
        let mut relayed = 0;
        for (id, tx) in sinks.iter() {
            if Some(*id) == origin {
                continue;
            }
            if tx.send(Relay::Change(change.clone())).is_ok() {
                relayed += 1;
            }
        }
        metrics::record_changes_relayed(relayed);
    }

    /// Signal every sink to flush and close, draining the registry.
    pub fn finalize_all(&self) {
        let mut sinks = self.sinks.lock().expect("sink registry poisoned");
        for (_, tx) in sinks.drain() {
            let _ = tx.send(Relay::Finalize);
        }
        metrics::set_attached_sinks(0);
    }

    /// Number of currently attached sinks.
    pub fn len(&self) -> usize {
        self.sinks.lock().expect("sink registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Change;

    fn change(seq: u64) -> Change {
        Change::push("p1", seq, 100, "k", b"v")
    }

    #[test]
    fn test_attach_detach() {
        let registry = SinkRegistry::new();
        assert_eq!(registry.len(), 0);

        let (a, _rx_a) = registry.attach();
        let (b, _rx_b) = registry.attach();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.detach(a);
        assert_eq!(registry.len(), 1);

        // Detaching twice is harmless
        registry.detach(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_relay_skips_origin() {
        let registry = SinkRegistry::new();
        let (a, mut rx_a) = registry.attach();
        let (_b, mut rx_b) = registry.attach();

        registry.relay(Some(a), &change(1));

        // Origin gets nothing, the other sink gets the change
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(rx_b.try_recv().unwrap(), Relay::Change(c) if c.seq == 1));
    }

    #[test]
    fn test_relay_without_origin_reaches_all() {
        let registry = SinkRegistry::new();
        let (_a, mut rx_a) = registry.attach();
        let (_b, mut rx_b) = registry.attach();

        registry.relay(None, &change(7));

        assert!(matches!(rx_a.try_recv().unwrap(), Relay::Change(c) if c.seq == 7));
        assert!(matches!(rx_b.try_recv().unwrap(), Relay::Change(c) if c.seq == 7));
    }

    #[test]
    fn test_relay_survives_dropped_receiver() {
        let registry = SinkRegistry::new();
        let (_a, rx_a) = registry.attach();
        let (_b, mut rx_b) = registry.attach();
        drop(rx_a);

        // Must not panic, and the live sink still receives
        registry.relay(None, &change(3));
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_finalize_all_drains() {
        let registry = SinkRegistry::new();
        let (_a, mut rx_a) = registry.attach();
        let (_b, mut rx_b) = registry.attach();

        registry.finalize_all();

        assert!(matches!(rx_a.try_recv().unwrap(), Relay::Finalize));
        assert!(matches!(rx_b.try_recv().unwrap(), Relay::Finalize));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_relay_preserves_order() {
        let registry = SinkRegistry::new();
        let (_a, mut rx) = registry.attach();

        for seq in 1..=5 {
            registry.relay(None, &change(seq));
        }
        for seq in 1..=5 {
            assert!(matches!(rx.try_recv().unwrap(), Relay::Change(c) if c.seq == seq));
        }
    }
}
