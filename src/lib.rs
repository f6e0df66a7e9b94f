//! Bitcoin Address Graph
//!
//! Builds a directed graph of value flow between Bitcoin addresses straight
//! from a node's raw `blk*.dat` files.
//!
//! This library provides functionality for:
//! - Locating block records inside memory-mapped container files
//! - Decoding blocks into a compact transaction model
//! - Tracking unspent outputs and linking spent addresses to receiving ones
//! - Checkpointing the graph and resuming interrupted runs
//! - Building file ranges in parallel shards and merging the results
//! - Querying neighborhoods and connected communities of the graph

pub mod blocks;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod run;

pub use config::Config;
pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging with the given log level
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
