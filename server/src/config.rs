//! Configuration management for the server.
//!
//! The config is a TOML file. Its path comes from `PAKHUIS_CONFIG` (which may
//! be set in a `.env` file) and defaults to `pakhuis.toml`.

use crate::store::StoreOptions;
use pakhuis_engine::{IndexedField, NodeId};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "PAKHUIS_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "pakhuis.toml";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// This store's node id, as seen by peers
    pub node_id: NodeId,
    /// Address the HTTP server binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// SQLite database file
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Field paths kept in the search index
    #[serde(default)]
    pub indexed_fields: Vec<IndexedField>,
    /// Peers to pull changes from
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// One replication peer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    /// The peer's node id; must match what it reports
    pub id: NodeId,
    /// Base URL of the peer's HTTP API
    pub url: String,
    /// Delay between successful sync cycles
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Entries requested per pull
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Per-request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Upper bound for the retry delay after failures
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("pakhuis.db")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_batch_size() -> u32 {
    100
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(300)
}

impl Config {
    /// Load the config from the file named by `PAKHUIS_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    /// Load the config from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&s)
    }

    /// Parse and validate a config document.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Store settings derived from this config.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            node_id: self.node_id.clone(),
            storage_path: self.storage_path.clone(),
            indexed_fields: self.indexed_fields.clone(),
            peers: self.peers.iter().map(|p| p.id.clone()).collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".to_string()));
        }

        let mut paths = HashSet::new();
        for field in &self.indexed_fields {
            if field.path.is_root() {
                return Err(ConfigError::Invalid(
                    "the document root cannot be indexed".to_string(),
                ));
            }
            if !paths.insert(&field.path) {
                return Err(ConfigError::Invalid(format!(
                    "field {} is indexed twice",
                    field.path
                )));
            }
        }

        let mut ids = HashSet::new();
        for peer in &self.peers {
            if peer.id == self.node_id {
                return Err(ConfigError::Invalid(format!(
                    "peer {} has this node's own id",
                    peer.id
                )));
            }
            if !ids.insert(&peer.id) {
                return Err(ConfigError::Invalid(format!("peer {} listed twice", peer.id)));
            }
            if peer.batch_size == 0 {
                return Err(ConfigError::Invalid(format!(
                    "peer {}: batch_size must be positive",
                    peer.id
                )));
            }
            if peer.max_backoff < peer.poll_interval {
                return Err(ConfigError::Invalid(format!(
                    "peer {}: max_backoff is shorter than poll_interval",
                    peer.id
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pakhuis_engine::IndexKind;

    const SAMPLE: &str = r#"
        node_id = "node-a"
        listen_address = "127.0.0.1:8080"
        storage_path = "/var/lib/pakhuis/a.db"
        indexed_fields = ["/status", { path = "/tags", kind = "in_list" }]

        [[peers]]
        id = "node-b"
        url = "http://b.internal:8080"
        poll_interval = "2s"
        max_backoff = "1m"
    "#;

    #[test]
    fn parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.node_id, "node-a");
        assert_eq!(config.listen_address.port(), 8080);
        assert_eq!(config.indexed_fields.len(), 2);
        assert_eq!(config.indexed_fields[0].kind, IndexKind::Eq);
        assert_eq!(config.indexed_fields[1].kind, IndexKind::InList);

        let peer = &config.peers[0];
        assert_eq!(peer.poll_interval, Duration::from_secs(2));
        assert_eq!(peer.max_backoff, Duration::from_secs(60));
        assert_eq!(peer.batch_size, 100);
        assert_eq!(peer.timeout, Duration::from_secs(10));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::parse(r#"node_id = "solo""#).unwrap();
        assert_eq!(config.listen_address, default_listen_address());
        assert!(config.peers.is_empty());
        assert!(config.indexed_fields.is_empty());
    }

    #[test]
    fn rejects_bad_pointer() {
        let err = Config::parse(
            r#"
            node_id = "a"
            indexed_fields = ["status"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_self_peer_and_duplicates() {
        let err = Config::parse(
            r#"
            node_id = "a"
            [[peers]]
            id = "a"
            url = "http://x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::parse(
            r#"
            node_id = "a"
            indexed_fields = ["/x", "/x"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_batch() {
        let err = Config::parse(
            r#"
            node_id = "a"
            [[peers]]
            id = "b"
            url = "http://x"
            batch_size = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load("/nonexistent/pakhuis.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
