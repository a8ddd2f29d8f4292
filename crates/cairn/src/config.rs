//! TOML configuration for the cairn CLI.
//!
//! Looked up at `--config`, then `$CONFIG_DIR/cairn/cairn.toml`. Every
//! section is optional; command-line flags override what the file sets.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cairn_types::AddParams;
use serde::{Deserialize, Serialize};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Parameters of every add.
    pub add: AddParams,
    /// The in-process cluster the CLI adds into.
    pub cluster: ClusterSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[cluster]` section.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Number of local peers.
    pub peers: usize,
    /// Artificial delay per block store, in milliseconds.
    pub store_latency_ms: Option<u64>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            peers: 3,
            store_latency_ms: None,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from `path`, or from the default location if it exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::read(p),
            None => match default_path() {
                Some(p) if p.is_file() => Self::read(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `$CONFIG_DIR/cairn/cairn.toml`, when the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cairn").join("cairn.toml"))
}
