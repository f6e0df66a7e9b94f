//! Configuration management
//!
//! This module handles loading and managing configuration from:
//! - Command-line arguments
//! - Configuration files (TOML)
//! - Defaults

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub range: RangeConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the block files live and which of them to scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding blk*.dat files (or a single file)
    #[serde(default = "default_blocks_dir")]
    pub blocks_dir: PathBuf,

    /// First file to scan, inclusive (e.g. "blk00000.dat")
    pub start_file: Option<String>,

    /// Last file to scan, inclusive
    pub end_file: Option<String>,

    /// Network whose magic delimits records and whose address encoding is used
    #[serde(default = "default_network")]
    pub network: String,
}

/// Transaction and time bounds of a run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RangeConfig {
    /// Transactions before this one are consumed but not built
    pub start_tx: Option<String>,

    /// The run finishes right after this transaction is built
    pub end_tx: Option<String>,

    /// Blocks with a later header timestamp (unix seconds) are skipped
    pub end_timestamp: Option<u32>,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory receiving timestamped snapshots
    #[serde(default = "default_checkpoint_dir")]
    pub directory: PathBuf,

    /// Flush after this many processed blocks
    #[serde(default = "default_every_blocks")]
    pub every_blocks: u64,

    /// Write a plain `from to` edge list next to every snapshot
    #[serde(default)]
    pub raw_edges: bool,
}

/// Builder options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildConfig {
    /// Retain unresolved inputs so a later merge can link them
    #[serde(default)]
    pub keep_unresolved: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit a progress line every this many blocks
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

// Default value functions

fn default_blocks_dir() -> PathBuf {
    PathBuf::from("~/.bitcoin/blocks")
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_every_blocks() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_every() -> u64 {
    10_000
}

// Default implementations

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            blocks_dir: default_blocks_dir(),
            start_file: None,
            end_file: None,
            network: default_network(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: default_checkpoint_dir(),
            every_blocks: default_every_blocks(),
            raw_edges: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            progress_every: default_progress_every(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file {:?}: {}", path, e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. ./config.toml
    /// 2. ~/.btc-address-graph/config.toml
    /// 3. /etc/btc-address-graph/config.toml
    pub fn load() -> Result<Self> {
        let mut paths = vec![PathBuf::from("config.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".btc-address-graph").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/btc-address-graph/config.toml"));

        for path in paths {
            if path.exists() {
                tracing::info!("Loading config from {:?}", path);
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Reject values the run controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint.every_blocks == 0 {
            return Err(Error::Config(
                "checkpoint.every_blocks must be greater than zero".to_string(),
            ));
        }
        self.network()?;
        Ok(())
    }

    /// Block directory with a leading `~` expanded to the home directory
    pub fn blocks_dir(&self) -> PathBuf {
        expand_home(&self.source.blocks_dir)
    }

    /// Checkpoint directory with a leading `~` expanded
    pub fn checkpoint_dir(&self) -> PathBuf {
        expand_home(&self.checkpoint.directory)
    }

    /// Parsed network
    pub fn network(&self) -> Result<bitcoin::Network> {
        bitcoin::Network::from_str(&self.source.network)
            .map_err(|e| Error::Config(format!("Unknown network {:?}: {}", self.source.network, e)))
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.network, "bitcoin");
        assert_eq!(config.checkpoint.every_blocks, 10_000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.build.keep_unresolved);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[source]
blocks_dir = "/data/blocks"
start_file = "blk00010.dat"
network = "testnet"

[range]
end_tx = "ff00"
end_timestamp = 1300000000

[checkpoint]
directory = "/data/graph"
every_blocks = 500
raw_edges = true

[logging]
level = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.blocks_dir(), PathBuf::from("/data/blocks"));
        assert_eq!(config.source.start_file.as_deref(), Some("blk00010.dat"));
        assert_eq!(config.network().unwrap(), bitcoin::Network::Testnet);
        assert_eq!(config.range.end_timestamp, Some(1_300_000_000));
        assert_eq!(config.checkpoint.every_blocks, 500);
        assert!(config.checkpoint.raw_edges);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.progress_every, 10_000);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.checkpoint.every_blocks = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.source.network = "dogecoin".to_string();
        assert!(config.network().is_err());
    }

    #[test]
    fn test_expand_home() {
        let plain = PathBuf::from("/var/blocks");
        assert_eq!(expand_home(&plain), plain);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(std::path::Path::new("~/.bitcoin/blocks")),
                home.join(".bitcoin/blocks")
            );
        }
    }
}
