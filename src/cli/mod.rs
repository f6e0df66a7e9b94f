//! CLI module
//!
//! This module defines the command-line interface using clap and implements
//! the command execution logic.

use crate::run::CancelToken;
use crate::{Config, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;
pub mod output;

/// Bitcoin address graph builder CLI
#[derive(Parser, Debug)]
#[command(name = "btc-address-graph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides config, RUST_LOG overrides both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or continue building) the address graph from block files
    Build(BuildArgs),

    /// Print statistics of the latest snapshot
    Inspect {
        /// Checkpoint directory (defaults to the configured one)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Show the neighborhood of this address
        #[arg(short, long)]
        address: Option<String>,

        /// Neighborhood radius in hops
        #[arg(long, default_value = "1")]
        radius: usize,

        /// Only follow outgoing edges
        #[arg(long)]
        directed: bool,

        /// List the largest N communities
        #[arg(long)]
        communities: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Merge the latest snapshots of several checkpoint directories
    Merge {
        /// Checkpoint directories, in file order
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Directory receiving the merged snapshot
        #[arg(short, long)]
        output: PathBuf,

        /// Also write the merged edges as a plain address list
        #[arg(long)]
        raw_edges: bool,
    },
}

/// Options of the build command; each overrides its config counterpart
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Directory of blk*.dat files, or a single file
    #[arg(short, long, env = "BTC_BLOCKS_DIR")]
    pub blocks_dir: Option<PathBuf>,

    /// First block file to scan (e.g. blk00000.dat)
    #[arg(long)]
    pub start_file: Option<String>,

    /// Last block file to scan
    #[arg(long)]
    pub end_file: Option<String>,

    /// Consume transactions without building until this one
    #[arg(long)]
    pub start_tx: Option<String>,

    /// Stop right after building this transaction
    #[arg(long)]
    pub end_tx: Option<String>,

    /// Skip blocks stamped after this unix time
    #[arg(long)]
    pub end_timestamp: Option<u32>,

    /// Network (bitcoin, testnet, signet, regtest)
    #[arg(short, long)]
    pub network: Option<String>,

    /// Checkpoint directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Flush a snapshot every N blocks
    #[arg(long)]
    pub every_blocks: Option<u64>,

    /// Write a plain edge list next to every snapshot
    #[arg(long)]
    pub raw_edges: bool,

    /// Keep unresolved inputs for a later merge
    #[arg(long)]
    pub keep_unresolved: bool,

    /// Continue from the latest snapshot
    #[arg(long)]
    pub resume: bool,

    /// Split the file range into N concurrently built shards
    #[arg(long, default_value = "1")]
    pub shards: usize,

    /// Output format of the run summary
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl BuildArgs {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.blocks_dir {
            config.source.blocks_dir = dir.clone();
        }
        if self.start_file.is_some() {
            config.source.start_file = self.start_file.clone();
        }
        if self.end_file.is_some() {
            config.source.end_file = self.end_file.clone();
        }
        if let Some(network) = &self.network {
            config.source.network = network.clone();
        }
        if self.start_tx.is_some() {
            config.range.start_tx = self.start_tx.clone();
        }
        if self.end_tx.is_some() {
            config.range.end_tx = self.end_tx.clone();
        }
        if self.end_timestamp.is_some() {
            config.range.end_timestamp = self.end_timestamp;
        }
        if let Some(dir) = &self.output {
            config.checkpoint.directory = dir.clone();
        }
        if let Some(every) = self.every_blocks {
            config.checkpoint.every_blocks = every;
        }
        if self.raw_edges {
            config.checkpoint.raw_edges = true;
        }
        if self.keep_unresolved {
            config.build.keep_unresolved = true;
        }
    }
}

/// Output format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text table
    #[default]
    Table,
}

/// Execute the CLI command
pub async fn execute(args: Cli, config: Config, cancel: CancelToken) -> Result<()> {
    match args.command {
        Commands::Build(build) => commands::build::execute(build, config, cancel).await,
        Commands::Inspect {
            dir,
            address,
            radius,
            directed,
            communities,
            output,
        } => commands::inspect::execute(
            dir.unwrap_or_else(|| config.checkpoint_dir()),
            address,
            radius,
            directed,
            communities,
            output,
        ),
        Commands::Merge {
            dirs,
            output,
            raw_edges,
        } => commands::merge::execute(dirs, output, raw_edges),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "btc-address-graph",
            "build",
            "--blocks-dir",
            "/data/blocks",
            "--end-tx",
            "abcd",
            "--resume",
            "--shards",
            "4",
        ])
        .unwrap();

        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.blocks_dir, Some(PathBuf::from("/data/blocks")));
                assert_eq!(args.end_tx.as_deref(), Some("abcd"));
                assert!(args.resume);
                assert_eq!(args.shards, 4);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_merge_requires_dirs() {
        assert!(Cli::try_parse_from(["btc-address-graph", "merge", "--output", "out"]).is_err());
        assert!(
            Cli::try_parse_from(["btc-address-graph", "merge", "a", "b", "--output", "out"])
                .is_ok()
        );
    }

    #[test]
    fn test_build_args_override_config() {
        let mut config = Config::default();
        config.range.end_tx = Some("from-file".to_string());
        let args = BuildArgs {
            network: Some("testnet".to_string()),
            every_blocks: Some(5),
            raw_edges: true,
            keep_unresolved: true,
            ..BuildArgs::default()
        };
        args.apply(&mut config);

        assert_eq!(config.source.network, "testnet");
        assert_eq!(config.checkpoint.every_blocks, 5);
        assert!(config.build.keep_unresolved);
        assert!(config.checkpoint.raw_edges);
        assert_eq!(config.range.end_tx.as_deref(), Some("from-file"));
    }
}
