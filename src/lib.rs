//! # Meshtable
//!
//! A peer-to-peer, eventually consistent replicated key→multivalue table.
//!
//! ## Architecture
//!
//! Every node holds the full table: one [`PeerState`](peer::PeerState)
//! record per known peer, each carrying that peer's values and its
//! replayable change log. All mutation flows through [`Change`] records
//! sequenced per origin peer, so replication is a flood-fill of changes
//! over whatever duplex streams the application wires together:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Table                                │
//! │                                                                  │
//! │  ┌────────────────┐    ┌─────────────────┐    ┌───────────────┐  │
//! │  │ push/pull/     │───►│ Merge + fan-out │───►│ SinkRegistry  │  │
//! │  │ heartbeat      │    │ (per-peer seq)  │    │ (no echo to   │  │
//! │  └────────────────┘    └─────────────────┘    │  origin link) │  │
//! │                               ▲               └───────┬───────┘  │
//! │                               │                       │          │
//! │  ┌────────────────┐    ┌──────┴──────────┐    ┌───────▼───────┐  │
//! │  │ list/keys/has  │    │ SyncSession     │◄──►│ LogStream     │  │
//! │  │ (TTL filtered) │    │ (digest, bulk,  │    │ (replay +     │  │
//! │  └────────────────┘    │  live relay)    │    │  live tail)   │  │
//! │                        └─────────────────┘    └───────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replication Model
//!
//! 1. **Catch-up**: sessions exchange digests of per-peer sequence
//!    cursors, then send bulk batches of the changes the other side is
//!    missing.
//! 2. **Live relay**: every change merged afterwards is relayed over
//!    all attached links except the one it arrived on.
//!
//! Changes for a given origin peer apply in strictly increasing
//! sequence order; anything at or below the local cursor is discarded,
//! which makes redelivery and mesh cycles harmless.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshtable::{Table, TableConfig};
//!
//! #[tokio::main]
//! async fn main() -> meshtable::Result<()> {
//!     let table = Table::new(TableConfig::default());
//!     table.push("services/web", b"10.0.0.5:8080")?;
//!
//!     // Replicate over any duplex byte stream
//!     let stream = tokio::net::TcpStream::connect("peer:9000").await?;
//!     let session = table.sync(stream);
//!
//!     // ... later
//!     session.finalize();
//!     table.destroy();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod peer;
mod registry;
pub mod session;
pub mod table;
pub mod wire;

// Re-exports for convenience
pub use config::TableConfig;
pub use error::{Result, TableError};
pub use peer::{PeerState, NEVER};
pub use session::{SessionState, SyncSession};
pub use table::{LogStream, Table};
pub use wire::{Change, ChangeOp, Message, MessageCodec, PeerSeq};
