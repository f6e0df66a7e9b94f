//! Address graph
//!
//! A petgraph multigraph keyed by the address index, plus degree and
//! statistics queries over it.

use super::{AddressIndex, VertexId};
use crate::blocks::Address;
use crate::{Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// A directed multigraph of value flow between addresses.
///
/// Vertices are addresses, edges go from an input address to an output address
/// of the same transaction. Parallel edges are kept: two transactions moving
/// coins along the same pair of addresses add two edges.
///
/// Node indices of the underlying graph coincide with the vertex identifiers of
/// the address index. Nodes are never removed, which keeps that true for the
/// whole lifetime of a run and across snapshots.
#[derive(Debug, Clone, Default)]
pub struct AddressGraph {
    /// The underlying graph structure.
    graph: DiGraph<(), ()>,

    /// Address ↔ vertex identifier mapping.
    index: AddressIndex,
}

impl AddressGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from its index and edge list
    pub fn from_parts(index: AddressIndex, edges: &[(VertexId, VertexId)]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(index.len(), edges.len());
        for _ in 0..index.len() {
            graph.add_node(());
        }
        for &(from, to) in edges {
            if from as usize >= index.len() || to as usize >= index.len() {
                return Err(Error::snapshot(format!(
                    "edge {}→{} references a vertex beyond {}",
                    from,
                    to,
                    index.len()
                )));
            }
            graph.add_edge(node(from), node(to), ());
        }
        Ok(Self { graph, index })
    }

    /// Vertex of `address`, creating it in the index and the graph in one step
    pub fn vertex(&mut self, address: &str) -> VertexId {
        let id = self.index.index_of(address);
        while self.graph.node_count() <= id as usize {
            self.graph.add_node(());
        }
        id
    }

    /// Adds an edge between two existing vertices.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) {
        self.graph.add_edge(node(from), node(to), ());
    }

    pub fn index(&self) -> &AddressIndex {
        &self.index
    }

    pub fn vertex_id(&self, address: &str) -> Option<VertexId> {
        self.index.get(address)
    }

    pub fn address_of(&self, id: VertexId) -> Result<&Address> {
        self.index.address_of(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index() as VertexId, e.target().index() as VertexId))
    }

    /// Number of edges between `from` and `to`
    pub fn edge_multiplicity(&self, from: VertexId, to: VertexId) -> usize {
        if !self.contains(from) || !self.contains(to) {
            return 0;
        }
        self.graph.edges_connecting(node(from), node(to)).count()
    }

    pub fn out_degree(&self, id: VertexId) -> usize {
        self.degree(id, Direction::Outgoing)
    }

    pub fn in_degree(&self, id: VertexId) -> usize {
        self.degree(id, Direction::Incoming)
    }

    fn degree(&self, id: VertexId, direction: Direction) -> usize {
        if !self.contains(id) {
            return 0;
        }
        self.graph.edges_directed(node(id), direction).count()
    }

    /// Neighbors of a vertex; `None` follows edges both ways
    pub fn neighbors(&self, id: VertexId, direction: Option<Direction>) -> Vec<VertexId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let iter = match direction {
            Some(direction) => self.graph.neighbors_directed(node(id), direction),
            None => self.graph.neighbors_undirected(node(id)),
        };
        iter.map(|n| n.index() as VertexId).collect()
    }

    fn contains(&self, id: VertexId) -> bool {
        (id as usize) < self.graph.node_count()
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            vertices: self.graph.node_count(),
            edges: self.graph.edge_count(),
            ..GraphStats::default()
        };
        for n in self.graph.node_indices() {
            let incoming = self.graph.edges_directed(n, Direction::Incoming).count();
            let outgoing = self.graph.edges_directed(n, Direction::Outgoing).count();
            if incoming == 0 {
                stats.sources += 1;
            }
            if outgoing == 0 {
                stats.sinks += 1;
            }
            stats.max_in_degree = stats.max_in_degree.max(incoming);
            stats.max_out_degree = stats.max_out_degree.max(outgoing);
        }
        stats
    }
}

fn node(id: VertexId) -> NodeIndex {
    NodeIndex::new(id as usize)
}

impl PartialEq for AddressGraph {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.graph.node_count() == other.graph.node_count()
            && self.edges().eq(other.edges())
    }
}

impl Eq for AddressGraph {}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GraphStats {
    pub vertices: usize,
    pub edges: usize,
    /// Vertices without incoming edges
    pub sources: usize,
    /// Vertices without outgoing edges
    pub sinks: usize,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
}
