//! Scanner and connection configuration.
//!
//! Values are passed explicitly into the scanner and clients; nothing here
//! is global. Configs load from TOML with defaults for every missing field,
//! so a file only needs the settings it changes:
//!
//! ```toml
//! [scanner]
//! scan_threshold = 50000
//!
//! [connection]
//! password = "hunter2"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyscanConfig {
    pub scanner: ScannerConfig,
    pub connection: ConnectionConfig,
}

impl KeyscanConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        toml::from_str(input).map_err(|e| format!("invalid config: {e}"))
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Renders the config as TOML, e.g. to print a template.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to render config: {e}"))
    }
}

/// Limits applied to every scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// COUNT hint used when a request doesn't give one.
    pub count_default: u32,
    /// Largest COUNT hint sent to the store; larger requests are clamped.
    pub max_count: u32,
    /// COUNT units a page may spend across all shards when the request
    /// doesn't set its own budget.
    pub scan_threshold: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            count_default: 200,
            max_count: 2000,
            scan_threshold: 10_000,
        }
    }
}

impl ScannerConfig {
    /// COUNT hint for a request: the default when absent or zero, never
    /// above `max_count`, never below one.
    pub fn effective_count(&self, requested: Option<u32>) -> u64 {
        let count = match requested {
            Some(n) if n > 0 => n,
            _ => self.count_default,
        };
        u64::from(count.min(self.max_count).max(1))
    }

    /// Page budget for a request. Raised to at least one call's worth so
    /// every page makes progress.
    pub fn effective_budget(&self, requested: Option<u32>, count: u64) -> u64 {
        u64::from(requested.unwrap_or(self.scan_threshold)).max(count)
    }
}

/// How clients connect and authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
    /// Per-command (or per-pipeline) reply timeout. `0` disables it.
    pub command_timeout_ms: u64,
    /// ACL username; `None` authenticates as the default user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Logical database to SELECT (standalone only).
    pub db: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            command_timeout_ms: 30_000,
            username: None,
            password: None,
            db: 0,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms))
    }
}
