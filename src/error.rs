// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicated table.
//!
//! Stale or duplicate changes and unrecognized op codes are **not** errors:
//! they are silently rejected by the merge rule and never surface here.
//! Errors in this module are connection- or lifecycle-level.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | I/O failure on a session's byte stream |
//! | `Stalled` | Yes | Open but silent link, closed by the liveness ticker |
//! | `Codec` | No | Malformed frame or undecodable message |
//! | `Destroyed` | No | Mutation attempted on a destroyed table |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! A failed session never takes the table or other sessions down with it.
//! Use [`TableError::is_retryable()`] to decide whether reconnecting the
//! underlying transport is worth attempting: transport drops and stalled
//! links are transient, everything else indicates a bug or a corrupt peer.

use thiserror::Error;

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors that can occur while running a table or one of its sessions.
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O failure on the underlying byte stream.
    ///
    /// The owning session transitions to CLOSED and detaches; the table
    /// and all other sessions are unaffected. Reconnection is the
    /// caller's responsibility.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The link went silent for a full liveness window.
    ///
    /// The socket was still open but no inbound traffic arrived within
    /// one TTL/2 tick, so the session closed itself. Converted into the
    /// same CLOSED transition as an explicit transport error.
    #[error("session stalled: no inbound traffic for {0} ms")]
    Stalled(u64),

    /// A frame could not be decoded (or a message could not be encoded).
    ///
    /// The data is corrupt at the source; not retryable.
    #[error("codec error: {0}")]
    Codec(String),

    /// The table was destroyed; no further local mutation is valid.
    #[error("table destroyed")]
    Destroyed,

    /// Unexpected internal error. Indicates a bug that needs investigation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TableError {
    /// Check if reconnecting the transport may resolve this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Stalled(_) => true,
            Self::Codec(_) => false,
            Self::Destroyed => false,
            Self::Internal(_) => false,
        }
    }
}
