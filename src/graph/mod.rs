//! Address graph - build and analyze the value-flow graph

pub mod address_graph;
pub mod analyzer;
pub mod builder;
pub mod index;
pub mod merge;
pub mod utxo;

/// Dense vertex identifier of an address
pub type VertexId = u32;

// Re-export key types
pub use address_graph::{AddressGraph, GraphStats};
pub use analyzer::{Communities, GraphAnalyzer, Neighborhood, VertexSummary};
pub use builder::{BuildStats, COINBASE_ADDRESS, GraphBuilder, GraphState, PendingSpend, TxOutcome};
pub use index::AddressIndex;
pub use merge::{MergeReport, merge_shards};
pub use utxo::{OutputSlots, UtxoTable};
