//! Block input - locating, scanning and decoding raw block files
//!
//! The graph builder consumes [`Block`]s in file order. This module turns a
//! directory of node block files into that stream:
//! - `files`: which container files to scan, in which order
//! - `scanner`: record boundaries inside one memory-mapped file
//! - `decoder`: consensus decoding of a record into the block model

use crate::Result;

pub mod decoder;
pub mod files;
pub mod models;
pub mod scanner;

pub use decoder::BitcoinDecoder;
pub use files::FileSet;
pub use models::{
    Address, Block, NULL_TX_ID, OutPoint, Transaction, TxId, TxInput, TxOutput, is_null_tx_id,
};
pub use scanner::{BlockFile, BlockScanner, MAINNET_MAGIC};

/// Decoder for the raw payload of one block record
pub trait BlockDecoder: Send + Sync {
    /// Decode a record payload exactly as the scanner yielded it
    fn decode(&self, raw: &[u8]) -> Result<Block>;
}
