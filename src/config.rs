//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::world::MAX_PLAYERS;

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one event per line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown log format: {}", other),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed to players
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// World ID (1-255)
    #[serde(default = "default_world_id")]
    pub world_id: u8,

    /// Game tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Maximum number of players (at most 2046)
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Directory holding `<plugin>.json` files
    #[serde(default = "default_plugin_config_dir")]
    pub plugin_config_dir: PathBuf,

    /// Frames buffered per player before new ones are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Idle encode buffers kept for reuse
    #[serde(default = "default_buffer_pool_size")]
    pub buffer_pool_size: usize,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub log_format: LogFormat,
}

// Default value functions
fn default_server_name() -> String {
    "Rustscape".to_string()
}

fn default_world_id() -> u8 {
    1
}

fn default_tick_rate() -> u64 {
    600 // 600ms = standard RS tick rate
}

fn default_max_players() -> u32 {
    2000
}

fn default_plugin_config_dir() -> PathBuf {
    PathBuf::from("config/plugins")
}

fn default_outbound_queue_capacity() -> usize {
    128
}

fn default_buffer_pool_size() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            server_name: default_server_name(),
            world_id: default_world_id(),
            tick_rate_ms: default_tick_rate(),
            max_players: default_max_players(),
            plugin_config_dir: default_plugin_config_dir(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            buffer_pool_size: default_buffer_pool_size(),
            debug: false,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("RUSTSCAPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::load_file(&config_path).await?;

        // Override with environment variables
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    /// Environment overrides are not applied.
    pub async fn load_file(config_path: &Path) -> Result<Self> {
        let mut config = if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path.to_path_buf();
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RUSTSCAPE_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("RUSTSCAPE_WORLD_ID") {
            if let Ok(id) = val.parse() {
                self.world_id = id;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_MAX_PLAYERS") {
            if let Ok(max) = val.parse() {
                self.max_players = max;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_PLUGIN_CONFIG_DIR") {
            self.plugin_config_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("RUSTSCAPE_OUTBOUND_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.outbound_queue_capacity = capacity;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_BUFFER_POOL_SIZE") {
            if let Ok(size) = val.parse() {
                self.buffer_pool_size = size;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("RUSTSCAPE_LOG_FORMAT") {
            match val.parse() {
                Ok(format) => self.log_format = format,
                Err(e) => tracing::warn!("Ignoring RUSTSCAPE_LOG_FORMAT: {}", e),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // World ID must be 1-255
        if self.world_id == 0 {
            anyhow::bail!("World ID must be between 1 and 255");
        }

        // Player indices are 11 bits wide, 2047 terminates the add list
        if self.max_players == 0 || self.max_players as usize > MAX_PLAYERS {
            anyhow::bail!("Max players must be between 1 and {}", MAX_PLAYERS);
        }

        // Tick rate must be reasonable
        if self.tick_rate_ms < 100 || self.tick_rate_ms > 5000 {
            anyhow::bail!("Tick rate must be between 100ms and 5000ms");
        }

        if self.outbound_queue_capacity == 0 {
            anyhow::bail!("Outbound queue capacity must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Rustscape");
        assert_eq!(config.world_id, 1);
        assert_eq!(config.tick_rate_ms, 600);
        assert_eq!(config.max_players, 2000);
        assert_eq!(config.plugin_config_dir, PathBuf::from("config/plugins"));
        assert_eq!(config.outbound_queue_capacity, 128);
        assert_eq!(config.buffer_pool_size, 64);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid world ID
        config.world_id = 0;
        assert!(config.validate().is_err());
        config.world_id = 1;

        config.max_players = 2048;
        assert!(config.validate().is_err());
        config.max_players = 2046;
        assert!(config.validate().is_ok());

        config.tick_rate_ms = 50;
        assert!(config.validate().is_err());
        config.tick_rate_ms = 600;

        config.outbound_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_players_leaves_terminator_index_free() {
        let mut config = ServerConfig::default();
        config.max_players = 2047;
        assert!(config.validate().is_err());

        config.max_players = 2046;
        assert!(config.validate().is_ok());
        assert_eq!(
            crate::game::player::PlayerList::new(config.max_players as usize).capacity(),
            config.max_players as usize
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml(
            r#"
            server_name = "Test World"
            world_id = 3
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server_name, "Test World");
        assert_eq!(config.world_id, 3);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.tick_rate_ms, 600);

        assert!(ServerConfig::from_toml("world_id = \"one\"").is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("rustscape-world-missing-config.toml");
        let config = ServerConfig::load_file(&path).await.unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.world_id, 1);
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!(
            "rustscape-world-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "max_players = 12\n").unwrap();

        let config = tokio_test::block_on(ServerConfig::load_file(&path)).unwrap();
        assert_eq!(config.max_players, 12);
        assert_eq!(config.server_name, "Rustscape");

        std::fs::remove_file(&path).unwrap();
    }
}
