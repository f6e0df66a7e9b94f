//! Decoded block data models
//!
//! These are the only shapes the graph builder sees. Every decoder, whatever
//! its wire format, produces them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque payment destination
pub type Address = String;

/// Transaction identifier (hex hash for Bitcoin)
pub type TxId = String;

/// Reference to an output of an earlier transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_id: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_id: impl Into<TxId>, index: u32) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// A decoded block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash
    pub hash: String,

    /// Header timestamp (unix seconds)
    pub timestamp: u32,

    /// Transactions in block order
    pub transactions: Vec<Transaction>,
}

/// A decoded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash
    pub id: TxId,

    /// Transaction inputs
    pub inputs: Vec<TxInput>,

    /// Transaction outputs
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Every output address, in output order, duplicates kept
    pub fn output_addresses(&self) -> Vec<Address> {
        self.outputs
            .iter()
            .flat_map(|o| o.addresses.iter().cloned())
            .collect()
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.iter().any(TxInput::is_coinbase)
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Spent output
    pub prev_out: OutPoint,
}

impl TxInput {
    pub fn new(tx_id: impl Into<TxId>, index: u32) -> Self {
        Self {
            prev_out: OutPoint::new(tx_id, index),
        }
    }

    /// Coinbase inputs reference the all-zero transaction id
    pub fn is_coinbase(&self) -> bool {
        is_null_tx_id(&self.prev_out.tx_id)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxOutput {
    /// Addresses the output pays; empty for unrecognised scripts
    pub addresses: Vec<Address>,
}

impl TxOutput {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Address>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

/// All-zero id used by coinbase inputs
pub const NULL_TX_ID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub fn is_null_tx_id(tx_id: &str) -> bool {
    !tx_id.is_empty() && tx_id.bytes().all(|b| b == b'0')
}
