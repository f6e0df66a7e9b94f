//! Merging independently built shards into one graph
//!
//! Shards cover disjoint, contiguous file ranges. Merging them in file order:
//! 1. re-keys every shard vertex by address into the merged index;
//! 2. appends every shard edge under the new identifiers;
//! 3. unions the UTXO tables (a transaction live in two shards is a
//!    duplicate, as in a single run);
//! 4. replays the pending spends of all shards against the merged table,
//!    adding the edges no single shard could see.

use super::builder::link;
use super::{GraphState, VertexId};
use crate::Result;

/// What a merge added beyond the shards' own edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub shards: usize,
    pub resolved_pending: usize,
    pub remaining_pending: usize,
    pub edges_linked: usize,
}

/// Merge shard states given in file order
pub fn merge_shards(shards: Vec<GraphState>) -> Result<(GraphState, MergeReport)> {
    let mut merged = GraphState::default();
    let mut report = MergeReport {
        shards: shards.len(),
        ..MergeReport::default()
    };
    let mut pending = Vec::new();

    for shard in shards {
        let remap: Vec<VertexId> = shard
            .graph
            .index()
            .iter()
            .map(|(_, address)| merged.graph.vertex(address))
            .collect();

        for (from, to) in shard.graph.edges() {
            merged.graph.add_edge(remap[from as usize], remap[to as usize]);
        }

        for (tx_id, slots) in shard.utxos.into_entries() {
            merged.utxos.record_outputs(&tx_id, slots)?;
        }

        pending.extend(shard.pending);
    }

    for spend in pending {
        match merged
            .utxos
            .take_output(&spend.prev_out.tx_id, spend.prev_out.index)
        {
            Ok(sources) => {
                report.resolved_pending += 1;
                report.edges_linked += link(&mut merged.graph, &sources, &spend.outputs);
            }
            Err(e) if e.is_recoverable() => merged.pending.push(spend),
            Err(e) => return Err(e),
        }
    }
    report.remaining_pending = merged.pending.len();

    tracing::info!(
        "Merged {} shards: {} vertices, {} edges, {} pending spends resolved, {} remaining",
        report.shards,
        merged.graph.vertex_count(),
        merged.graph.edge_count(),
        report.resolved_pending,
        report.remaining_pending
    );
    Ok((merged, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::blocks::{NULL_TX_ID, Transaction, TxInput, TxOutput};
    use crate::graph::{COINBASE_ADDRESS, GraphBuilder};

    fn tx(id: &str, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        Transaction {
            id: id.to_string(),
            inputs,
            outputs,
        }
    }

    fn build(txs: &[Transaction]) -> GraphState {
        let mut builder = GraphBuilder::new().keep_unresolved(true);
        for t in txs {
            builder.apply_transaction(t).unwrap();
        }
        builder.into_state()
    }

    fn edges_by_address(state: &GraphState) -> Vec<(String, String)> {
        let mut edges: Vec<_> = state
            .graph
            .edges()
            .map(|(f, t)| {
                (
                    state.graph.address_of(f).unwrap().clone(),
                    state.graph.address_of(t).unwrap().clone(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    #[test]
    fn test_merge_matches_sequential_build() {
        let txs = vec![
            tx("T1", vec![TxInput::new(NULL_TX_ID, u32::MAX)], vec![TxOutput::new(["A"])]),
            tx("T2", vec![], vec![TxOutput::new(["C"]), TxOutput::new(["D"])]),
            tx("T3", vec![TxInput::new("T1", 0)], vec![TxOutput::new(["B"])]),
            tx("T4", vec![TxInput::new("T2", 1)], vec![TxOutput::new(["A", "E"])]),
        ];

        let sequential = build(&txs);
        let (merged, report) = merge_shards(vec![build(&txs[..2]), build(&txs[2..])]).unwrap();

        assert_eq!(report.shards, 2);
        assert_eq!(report.resolved_pending, 2);
        assert_eq!(report.remaining_pending, 0);
        assert_eq!(report.edges_linked, 3);
        assert_eq!(edges_by_address(&merged), edges_by_address(&sequential));
        assert_eq!(merged.utxos, sequential.utxos);
        assert_eq!(merged.graph.vertex_count(), sequential.graph.vertex_count());
        assert_eq!(merged.graph.address_of(0).unwrap(), COINBASE_ADDRESS);
    }

    #[test]
    fn test_unresolvable_pending_is_kept() {
        let shard = build(&[tx("T9", vec![TxInput::new("T0", 0)], vec![TxOutput::new(["Z"])])]);
        let (merged, report) = merge_shards(vec![shard]).unwrap();
        assert_eq!(report.remaining_pending, 1);
        assert_eq!(merged.pending.len(), 1);
    }

    #[test]
    fn test_overlapping_shards_conflict() {
        let t1 = tx("T1", vec![], vec![TxOutput::new(["A"])]);
        let err = merge_shards(vec![build(&[t1.clone()]), build(&[t1])]).unwrap_err();
        assert!(matches!(err, Error::DuplicateTransaction(_)));
    }
}
