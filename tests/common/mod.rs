//! Shared test utilities for the integration tests.
//!
//! This module provides:
//! - Table construction with short test-friendly TTLs
//! - Duplex transport wiring between tables
//! - Polling helpers for eventually consistent assertions

use meshtable::{SyncSession, Table, TableConfig};
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Install a tracing subscriber once for the whole test binary.
/// `RUST_LOG=meshtable=debug` makes test failures much easier to read.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A table with a fixed id and the given TTL.
pub fn test_table(id: &str, ttl: Duration) -> Table {
    init_tracing();
    Table::new(TableConfig::for_testing(id, ttl))
}

/// A table with the default 10s TTL, long enough that liveness never
/// interferes with a test that is not about liveness.
pub fn table(id: &str) -> Table {
    test_table(id, Duration::from_secs(10))
}

/// Wire two tables together over an in-memory duplex transport.
pub fn connect(a: &Table, b: &Table) -> (SyncSession, SyncSession) {
    let (io_a, io_b) = tokio::io::duplex(64 * 1024);
    (a.sync(io_a), b.sync(io_b))
}

/// Poll `cond` until it holds, panicking after `timeout`.
pub async fn wait_for<F>(timeout: Duration, what: &str, cond: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `cond` holds, with a default timeout generous enough for CI.
pub async fn eventually<F>(what: &str, cond: F)
where
    F: Fn() -> bool,
{
    wait_for(Duration::from_secs(5), what, cond).await;
}

/// Sorted copy of a value set, for order-insensitive assertions.
pub fn sorted(mut values: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    values.sort();
    values
}
