// ABOUTME: Configuration management for replwatch
// Handles the bridge transport command, client tuning and the replication topology

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod topology;

pub use crate::client::{ClientConfig, LimiterKind};
pub use topology::{Connection, Filters, GroupConfig, MemberConfig, Topology};

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// How to reach servers
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Limiter, cache and recovery tuning
    #[serde(default)]
    pub client: ClientConfig,

    /// Replication groups and their members
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Helper process that speaks the management protocol on our behalf
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Executable to spawn, one process per server
    #[serde(default = "default_bridge_command")]
    pub command: String,

    /// Arguments; `{server}` is replaced with the server name
    #[serde(default = "default_bridge_args")]
    pub args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: default_bridge_args(),
        }
    }
}

fn default_bridge_command() -> String {
    "replication-bridge".to_string()
}

fn default_bridge_args() -> Vec<String> {
    vec!["--server".to_string(), "{server}".to_string()]
}

impl AppConfig {
    /// Default location: `~/.replwatch/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".replwatch")
            .join("config.toml")
    }

    /// Load configuration from `path`, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Topology view over the configured groups
    pub fn topology(&self) -> Topology<'_> {
        Topology::new(&self.groups)
    }
}

/// Serde helper for Duration as seconds (u64)
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
