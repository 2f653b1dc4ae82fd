//! Configuration for a replicated table.
//!
//! Configuration is passed to [`Table::new()`](crate::Table::new) and can be
//! constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use meshtable::config::TableConfig;
//!
//! let config = TableConfig {
//!     node_id: Some("node-1".into()),
//!     ttl: "10s".into(),
//! };
//! ```
//!
//! # TTL and derived timers
//!
//! The TTL is the staleness threshold: a non-local peer whose last applied
//! change is older than one TTL drops out of `list()` results. Two timers
//! are derived from it, both with period `ttl / 2`:
//!
//! - the table's local heartbeat clock, which guarantees at least one
//!   liveness signal lands within any TTL window even across one dropped
//!   tick, and
//! - each session's liveness ticker, which closes a silently-stalled link.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TTL when the configured string fails to parse.
const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Configuration for one table instance.
///
/// # Fields
///
/// - `node_id`: This peer's unique identifier. Generated (UUID v4) when
///   absent.
/// - `ttl`: Staleness threshold as a duration string (e.g., `"10s"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Peer identifier for the local node.
    ///
    /// Must be unique across the cluster; omit to have one generated.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Time-to-live as a duration string (e.g., "10s", "500ms").
    /// Parsed to `Duration` internally.
    #[serde(default = "default_ttl")]
    pub ttl: String,
}

fn default_ttl() -> String {
    "10s".to_string()
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            ttl: default_ttl(),
        }
    }
}

impl TableConfig {
    /// Parse the ttl string to a Duration. Falls back to 10 seconds.
    pub fn ttl(&self) -> Duration {
        humantime::parse_duration(&self.ttl).unwrap_or(DEFAULT_TTL)
    }

    /// Period of the local heartbeat clock and per-session liveness ticker.
    ///
    /// Half the TTL, floored at 1ms so a tiny TTL cannot produce a
    /// zero-period timer.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.ttl() / 2).max(Duration::from_millis(1))
    }

    /// Create a config with a fixed id and TTL for testing.
    pub fn for_testing(node_id: &str, ttl: Duration) -> Self {
        Self {
            node_id: Some(node_id.to_string()),
            ttl: humantime::format_duration(ttl).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TableConfig::default();
        assert!(config.node_id.is_none());
        assert_eq!(config.ttl(), Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
            ("2min", Duration::from_secs(120)),
        ];

        for (input, expected) in test_cases {
            let config = TableConfig {
                ttl: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.ttl(), expected, "failed for input: {}", input);
        }
    }

    #[test]
    fn test_ttl_invalid_fallback() {
        let config = TableConfig {
            ttl: "invalid".to_string(),
            ..Default::default()
        };
        // Falls back to 10 seconds
        assert_eq!(config.ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_heartbeat_interval_is_half_ttl() {
        let config = TableConfig::for_testing("p1", Duration::from_millis(100));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_heartbeat_interval_floor() {
        let config = TableConfig::for_testing("p1", Duration::from_nanos(1));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_for_testing_roundtrips_ttl() {
        let config = TableConfig::for_testing("p1", Duration::from_millis(250));
        assert_eq!(config.node_id.as_deref(), Some("p1"));
        assert_eq!(config.ttl(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = TableConfig {
            node_id: Some("node-roundtrip".to_string()),
            ttl: "30s".to_string(),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: TableConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.node_id.as_deref(), Some("node-roundtrip"));
        assert_eq!(parsed.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let parsed: TableConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.node_id.is_none());
        assert_eq!(parsed.ttl(), Duration::from_secs(10));
    }
}
