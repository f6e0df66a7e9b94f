//! Incremental graph builder
//!
//! For every transaction the builder:
//! 1. records its outputs in the UTXO table;
//! 2. resolves each input to the addresses of the output it spends (the
//!    coinbase marker for coinbase inputs);
//! 3. links every resolved input address to every output address.
//!
//! Inputs whose spent output was never observed (blocks are read in file
//! order, not height order, and ranges may start mid-chain) are counted and
//! skipped. Only a duplicate transaction id stops the builder.

use super::{AddressGraph, UtxoTable};
use crate::blocks::{Address, OutPoint, Transaction};
use crate::error::UnresolvedReason;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Synthetic source vertex of newly minted coins
pub const COINBASE_ADDRESS: &str = "coinbase";

/// Everything a run derives from the blocks it has seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    pub graph: AddressGraph,
    pub utxos: UtxoTable,
    /// Inputs kept for a later merge because their output was not observed
    pub pending: Vec<PendingSpend>,
}

/// An input whose spent output lies outside the observed window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSpend {
    pub prev_out: OutPoint,
    /// Output addresses of the spending transaction
    pub outputs: Vec<Address>,
}

/// Running totals of a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub transactions: u64,
    pub inputs: u64,
    pub coinbase_inputs: u64,
    pub resolved_inputs: u64,
    pub edges: u64,
    /// Inputs referencing a transaction with no unspent outputs on record
    pub unknown_transaction: u64,
    /// Inputs referencing a missing slot of a known transaction
    pub output_not_found: u64,
}

impl BuildStats {
    pub fn unresolved(&self) -> u64 {
        self.unknown_transaction + self.output_not_found
    }

    fn record_unresolved(&mut self, reason: UnresolvedReason) {
        match reason {
            UnresolvedReason::UnknownTransaction => self.unknown_transaction += 1,
            UnresolvedReason::OutputNotFound => self.output_not_found += 1,
        }
    }
}

/// Effect of one transaction on the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOutcome {
    pub edges_added: usize,
    pub resolved_inputs: usize,
    pub unresolved_inputs: usize,
}

/// Applies transactions to a [`GraphState`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    state: GraphState,
    stats: BuildStats,
    keep_unresolved: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue building on top of restored state
    pub fn with_state(state: GraphState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Keep unresolved inputs as [`PendingSpend`]s
    pub fn keep_unresolved(mut self, keep: bool) -> Self {
        self.keep_unresolved = keep;
        self
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn graph(&self) -> &AddressGraph {
        &self.state.graph
    }

    pub fn utxos(&self) -> &UtxoTable {
        &self.state.utxos
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn into_state(self) -> GraphState {
        self.state
    }

    /// Fold one transaction into the graph
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<TxOutcome> {
        let slots: BTreeMap<u32, Vec<Address>> = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(i, o)| (i as u32, o.addresses.clone()))
            .collect();
        self.state.utxos.record_outputs(&tx.id, slots)?;

        let outputs = tx.output_addresses();
        let mut outcome = TxOutcome::default();

        for input in &tx.inputs {
            self.stats.inputs += 1;

            let sources = if input.is_coinbase() {
                self.stats.coinbase_inputs += 1;
                vec![COINBASE_ADDRESS.to_string()]
            } else {
                match self
                    .state
                    .utxos
                    .take_output(&input.prev_out.tx_id, input.prev_out.index)
                {
                    Ok(addresses) => addresses,
                    Err(Error::UnresolvedInput { reason, .. }) => {
                        tracing::debug!(
                            "Input {} of {} unresolved: {}",
                            input.prev_out,
                            tx.id,
                            reason
                        );
                        self.stats.record_unresolved(reason);
                        outcome.unresolved_inputs += 1;
                        if self.keep_unresolved {
                            self.state.pending.push(PendingSpend {
                                prev_out: input.prev_out.clone(),
                                outputs: outputs.clone(),
                            });
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            self.stats.resolved_inputs += 1;
            outcome.resolved_inputs += 1;
            outcome.edges_added += link(&mut self.state.graph, &sources, &outputs);
        }

        self.stats.transactions += 1;
        self.stats.edges += outcome.edges_added as u64;
        Ok(outcome)
    }
}

/// Add one edge per (source, target) pair, creating vertices as needed
pub(crate) fn link(graph: &mut AddressGraph, sources: &[Address], targets: &[Address]) -> usize {
    let sources: Vec<_> = sources.iter().map(|a| graph.vertex(a)).collect();
    let targets: Vec<_> = targets.iter().map(|a| graph.vertex(a)).collect();

    for &from in &sources {
        for &to in &targets {
            graph.add_edge(from, to);
        }
    }
    sources.len() * targets.len()
}
