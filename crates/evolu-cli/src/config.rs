//! On-disk configuration for a local owner and its sync transports.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CliError, Result};

/// One configured sync transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportConfig {
    /// A relay reachable over WebSocket.
    WebSocket {
        /// The relay's URL, e.g. `wss://relay.example.com/sync`.
        url: String,
    },
}

/// A single extra index declaration, carried through to whichever storage
/// driver the host wires in; the in-memory driver this binary ships with
/// ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDeclaration {
    /// The table the index covers.
    pub table: String,
    /// Column names, in index order.
    pub columns: Vec<String>,
}

/// Configuration for one local Evolu instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instance name, used as a file suffix when persisting state.
    pub name: String,
    /// Zero or more relays to reconcile against. Empty means local-only.
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
    /// Page URL used on reset/restore; a UI-layer concern the core only
    /// carries through configuration.
    #[serde(default)]
    pub reload_url: String,
    /// Extra user indexes beyond the auto-added clock and history tables.
    #[serde(default)]
    pub indexes: Vec<IndexDeclaration>,
    /// Hex-encoded 32-byte mnemonic seed overriding local owner creation.
    /// Absent means generate and persist a fresh mnemonic on first run.
    #[serde(default)]
    pub external_app_owner: Option<String>,
    /// Run against a non-persistent, in-memory store only.
    #[serde(default)]
    pub in_memory: bool,
    /// Clock drift tolerance, in milliseconds.
    #[serde(default = "default_max_drift_ms")]
    pub max_drift_ms: u64,
    /// Install the `tracing-subscriber` logging layer.
    #[serde(default = "default_enable_logging")]
    pub enable_logging: bool,
}

fn default_max_drift_ms() -> u64 {
    5 * 60 * 1000
}

fn default_enable_logging() -> bool {
    true
}

impl Config {
    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::Config(format!("reading {path:?}: {e}")))?;
        toml::from_str(&text).map_err(|e| CliError::Config(format!("parsing {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolu.toml");
        std::fs::write(&path, "name = \"notes\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.name, "notes");
        assert!(config.transports.is_empty());
        assert_eq!(config.max_drift_ms, 5 * 60 * 1000);
        assert!(config.enable_logging);
        assert!(!config.in_memory);
    }

    #[test]
    fn websocket_transport_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolu.toml");
        std::fs::write(
            &path,
            r#"
            name = "notes"
            [[transports]]
            type = "WebSocket"
            url = "wss://relay.example.com/sync"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        match &config.transports[..] {
            [TransportConfig::WebSocket { url }] => assert_eq!(url, "wss://relay.example.com/sync"),
            other => panic!("expected one WebSocket transport, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/nonexistent/evolu.toml")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
