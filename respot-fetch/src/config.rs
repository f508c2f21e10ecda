//! Configuration for the fetch tool.

use std::path::Path;
use std::time::Duration;

use respot_core::PlayerConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Access point to connect to.
    pub network: NetworkConfig,
    /// Download tuning.
    pub player: PlayerSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

/// Player timeouts and parallelism.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSection {
    /// Deadline for an audio key response, in milliseconds.
    pub key_timeout_ms: u64,
    /// Deadline for one chunk download, in milliseconds.
    pub chunk_timeout_ms: u64,
    /// Chunk channels open at once per file.
    pub max_parallel_channels: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4070,
        }
    }
}

impl Default for PlayerSection {
    fn default() -> Self {
        let defaults = PlayerConfig::default();
        Self {
            key_timeout_ms: defaults.key_timeout.as_millis() as u64,
            chunk_timeout_ms: defaults.chunk_timeout.as_millis() as u64,
            max_parallel_channels: defaults.max_parallel_channels,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl FetchConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert the `[player]` section into a core `PlayerConfig`.
    pub fn to_player_config(&self) -> PlayerConfig {
        PlayerConfig {
            key_timeout: Duration::from_millis(self.player.key_timeout_ms.max(1)),
            chunk_timeout: Duration::from_millis(self.player.chunk_timeout_ms.max(1)),
            max_parallel_channels: self.player.max_parallel_channels.clamp(1, 64),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
