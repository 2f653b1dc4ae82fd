//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Change merge outcomes (applied / rejected)
//! - Gossip fan-out volume
//! - Session lifecycle (attach, detach, stalled closures)
//! - Catch-up batch sizes
//! - Known peer count
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `meshtable_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track distributions.

use metrics::{counter, gauge, histogram};

/// Record a merged change by op name ("push", "pull", ...).
pub fn record_change_applied(op: &str) {
    counter!("meshtable_changes_applied_total", "op" => op.to_string()).increment(1);
}

/// Record a rejected (stale, duplicate, or unrecognized) change.
pub fn record_change_rejected(op: &str) {
    counter!("meshtable_changes_rejected_total", "op" => op.to_string()).increment(1);
}

/// Record changes relayed to attached sessions.
pub fn record_changes_relayed(count: usize) {
    counter!("meshtable_changes_relayed_total").increment(count as u64);
}

/// Record a local heartbeat tick.
pub fn record_heartbeat() {
    counter!("meshtable_heartbeats_total").increment(1);
}

/// Record an update notification (one per distinct key per merged batch).
pub fn record_update_notification() {
    counter!("meshtable_update_notifications_total").increment(1);
}

/// Set the number of currently attached sinks (sessions + log tails).
pub fn set_attached_sinks(count: usize) {
    gauge!("meshtable_attached_sinks").set(count as f64);
}

/// Set the number of known peers (live or not).
pub fn set_known_peers(count: usize) {
    gauge!("meshtable_known_peers").set(count as f64);
}

/// Record a session reaching ACTIVE.
pub fn record_session_established() {
    counter!("meshtable_sessions_established_total").increment(1);
}

/// Record a session close by reason ("finalized", "eof", "stalled", "error").
pub fn record_session_closed(reason: &str) {
    counter!("meshtable_sessions_closed_total", "reason" => reason.to_string()).increment(1);
}

/// Record the size of one catch-up bulk sent during handshake.
pub fn record_catchup_batch(changes: usize) {
    histogram!("meshtable_catchup_batch_changes").record(changes as f64);
}
