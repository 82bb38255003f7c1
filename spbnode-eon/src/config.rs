use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid node config: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_publish_period_ms() -> u64 {
    1000
}

fn default_rebirth_cooldown_ms() -> u64 {
    5000
}

/// Node level settings, usually loaded from a JSON file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeConfig {
    pub group_id: String,
    pub node_id: String,
    #[serde(default = "default_publish_period_ms")]
    pub publish_period_ms: u64,
    #[serde(default = "default_rebirth_cooldown_ms")]
    pub rebirth_cooldown_ms: u64,
    /// Host whose STATE is watched. A rebirth is sent when it comes back online.
    #[serde(default)]
    pub primary_host_id: Option<String>,
}

impl NodeConfig {
    pub fn new<S1: Into<String>, S2: Into<String>>(group_id: S1, node_id: S2) -> Self {
        Self {
            group_id: group_id.into(),
            node_id: node_id.into(),
            publish_period_ms: default_publish_period_ms(),
            rebirth_cooldown_ms: default_rebirth_cooldown_ms(),
            primary_host_id: None,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn publish_period(&self) -> Duration {
        Duration::from_millis(self.publish_period_ms)
    }

    pub fn rebirth_cooldown(&self) -> Duration {
        Duration::from_millis(self.rebirth_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config =
            NodeConfig::from_json_str(r#"{"group_id": "BME280", "node_id": "Node1"}"#).unwrap();
        assert_eq!(config, NodeConfig::new("BME280", "Node1"));
        assert_eq!(config.publish_period(), Duration::from_secs(1));
        assert_eq!(config.rebirth_cooldown(), Duration::from_secs(5));
    }

    #[test]
    fn full() {
        let config = NodeConfig::from_json_str(
            r#"{
                "group_id": "G",
                "node_id": "N",
                "publish_period_ms": 250,
                "rebirth_cooldown_ms": 0,
                "primary_host_id": "scada"
            }"#,
        )
        .unwrap();
        assert_eq!(config.publish_period(), Duration::from_millis(250));
        assert_eq!(config.rebirth_cooldown(), Duration::ZERO);
        assert_eq!(config.primary_host_id.as_deref(), Some("scada"));
    }

    #[test]
    fn errors() {
        assert!(matches!(
            NodeConfig::from_json_str(r#"{"group_id": "G"}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            NodeConfig::from_file("/nonexistent/node.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
