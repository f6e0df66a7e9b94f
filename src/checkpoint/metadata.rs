//! Run metadata persisted with every snapshot

use crate::blocks::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of recently processed block hashes kept for resume checks
pub const BLOCK_HISTORY: usize = 50;

/// Progress markers of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// When the graph was first created
    pub created_at: DateTime<Utc>,

    /// Header timestamp of the last scanned block, skipped or not
    pub last_block_timestamp: Option<u32>,

    /// Hash of the last processed block
    pub last_block_hash: Option<String>,

    /// Last processed transaction
    pub last_tx_id: Option<TxId>,

    /// File holding the last processed block
    pub last_file: Option<String>,

    /// Start transaction not reached yet
    pub pending_start_tx: Option<TxId>,

    /// Most recently processed block hashes, oldest first
    pub recent_blocks: VecDeque<String>,
}

impl RunMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            last_block_timestamp: None,
            last_block_hash: None,
            last_tx_id: None,
            last_file: None,
            pending_start_tx: None,
            recent_blocks: VecDeque::with_capacity(BLOCK_HISTORY),
        }
    }

    /// Mark a block as processed
    pub fn record_block(&mut self, hash: &str, file: &str) {
        if self.recent_blocks.len() == BLOCK_HISTORY {
            self.recent_blocks.pop_front();
        }
        self.recent_blocks.push_back(hash.to_string());
        self.last_block_hash = Some(hash.to_string());
        if self.last_file.as_deref() != Some(file) {
            self.last_file = Some(file.to_string());
        }
    }

    pub fn record_transaction(&mut self, tx_id: &str) {
        self.last_tx_id = Some(tx_id.to_string());
    }

    pub fn is_recent(&self, hash: &str) -> bool {
        self.recent_blocks.iter().any(|h| h == hash)
    }
}
