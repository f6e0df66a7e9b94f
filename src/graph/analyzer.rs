//! Graph analyzer
//!
//! Read-only queries over a built graph: the neighborhood of an address and a
//! partition of the graph into weakly connected components ("communities").
//! Components are only computed when first asked for.

use super::{AddressGraph, VertexId};
use crate::blocks::Address;
use crate::{Error, Result};
use petgraph::Direction;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// One vertex of an analysis result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexSummary {
    pub id: VertexId,
    pub address: Address,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// Vertices within a radius of an address, and the edges among them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighborhood {
    pub center: VertexId,
    pub radius: usize,
    pub vertices: Vec<VertexSummary>,
    pub edges: Vec<(VertexId, VertexId)>,
}

/// Weakly connected components, numbered by their lowest vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Communities {
    membership: Vec<u32>,
    sizes: Vec<usize>,
}

impl Communities {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn community_of(&self, vertex: VertexId) -> Option<u32> {
        self.membership.get(vertex as usize).copied()
    }

    pub fn members(&self, community: u32) -> Vec<VertexId> {
        self.membership
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == community)
            .map(|(v, _)| v as VertexId)
            .collect()
    }

    pub fn size(&self, community: u32) -> usize {
        self.sizes.get(community as usize).copied().unwrap_or(0)
    }

    /// Community ids by descending size
    pub fn largest(&self, n: usize) -> Vec<(u32, usize)> {
        let mut by_size: Vec<(u32, usize)> = self
            .sizes
            .iter()
            .enumerate()
            .map(|(c, &s)| (c as u32, s))
            .collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        by_size.truncate(n);
        by_size
    }
}

/// Read-only analysis over an [`AddressGraph`]
pub struct GraphAnalyzer<'a> {
    graph: &'a AddressGraph,
    communities: Option<Communities>,
}

impl<'a> GraphAnalyzer<'a> {
    pub fn new(graph: &'a AddressGraph) -> Self {
        Self {
            graph,
            communities: None,
        }
    }

    pub fn summary(&self, id: VertexId) -> Result<VertexSummary> {
        Ok(VertexSummary {
            id,
            address: self.graph.address_of(id)?.clone(),
            in_degree: self.graph.in_degree(id),
            out_degree: self.graph.out_degree(id),
        })
    }

    /// Everything reachable from `address` in at most `radius` hops
    ///
    /// With `directed` only outgoing edges are followed; otherwise edges are
    /// walked both ways.
    pub fn neighborhood(&self, address: &str, radius: usize, directed: bool) -> Result<Neighborhood> {
        let center = self
            .graph
            .vertex_id(address)
            .ok_or_else(|| Error::Analysis(format!("address {} is not in the graph", address)))?;
        let direction = directed.then_some(Direction::Outgoing);

        let mut seen = BTreeSet::from([center]);
        let mut frontier = vec![center];
        for _ in 0..radius {
            let mut next = Vec::new();
            for v in frontier {
                for n in self.graph.neighbors(v, direction) {
                    if seen.insert(n) {
                        next.push(n);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let vertices = seen
            .iter()
            .map(|&v| self.summary(v))
            .collect::<Result<Vec<_>>>()?;
        let edges = self
            .graph
            .edges()
            .filter(|(f, t)| seen.contains(f) && seen.contains(t))
            .collect();

        Ok(Neighborhood {
            center,
            radius,
            vertices,
            edges,
        })
    }

    /// Weakly connected components, computed on first use
    pub fn communities(&mut self) -> Result<&Communities> {
        if self.communities.is_none() {
            self.communities = Some(self.detect_communities()?);
        }
        self.communities
            .as_ref()
            .ok_or_else(|| Error::Analysis("community detection produced no result".to_string()))
    }

    fn detect_communities(&self) -> Result<Communities> {
        let n = self.graph.vertex_count();
        if n == 0 {
            return Err(Error::Analysis(
                "cannot detect communities of an empty graph".to_string(),
            ));
        }
        tracing::info!("Detecting communities over {} vertices", n);

        let mut components = UnionFind::<usize>::new(n);
        for (from, to) in self.graph.edges() {
            components.union(from as usize, to as usize);
        }

        let mut ids: HashMap<usize, u32> = HashMap::new();
        let mut sizes = Vec::new();
        let membership = components
            .into_labeling()
            .into_iter()
            .map(|root| {
                let id = *ids.entry(root).or_insert_with(|| {
                    sizes.push(0);
                    (sizes.len() - 1) as u32
                });
                sizes[id as usize] += 1;
                id
            })
            .collect();

        Ok(Communities { membership, sizes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A → B → C → D, E → B, and an unrelated F → G
    fn sample() -> AddressGraph {
        let mut graph = AddressGraph::new();
        let ids: Vec<_> = ["A", "B", "C", "D", "E", "F", "G"]
            .iter()
            .map(|a| graph.vertex(a))
            .collect();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[1], ids[2]);
        graph.add_edge(ids[2], ids[3]);
        graph.add_edge(ids[4], ids[1]);
        graph.add_edge(ids[5], ids[6]);
        graph
    }

    fn addresses(n: &Neighborhood) -> Vec<&str> {
        n.vertices.iter().map(|v| v.address.as_str()).collect()
    }

    #[test]
    fn test_directed_neighborhood() {
        let graph = sample();
        let analyzer = GraphAnalyzer::new(&graph);

        let n = analyzer.neighborhood("A", 2, true).unwrap();
        assert_eq!(addresses(&n), vec!["A", "B", "C"]);
        assert_eq!(n.edges, vec![(0, 1), (1, 2)]);

        let b = &n.vertices[1];
        assert_eq!((b.in_degree, b.out_degree), (2, 1));
    }

    #[test]
    fn test_undirected_neighborhood() {
        let graph = sample();
        let analyzer = GraphAnalyzer::new(&graph);

        let n = analyzer.neighborhood("C", 1, false).unwrap();
        assert_eq!(addresses(&n), vec!["B", "C", "D"]);

        let n = analyzer.neighborhood("C", 2, false).unwrap();
        assert_eq!(addresses(&n), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_unknown_address() {
        let graph = sample();
        let analyzer = GraphAnalyzer::new(&graph);
        assert!(matches!(
            analyzer.neighborhood("Z", 1, true),
            Err(Error::Analysis(_))
        ));
    }

    #[test]
    fn test_communities() {
        let graph = sample();
        let mut analyzer = GraphAnalyzer::new(&graph);
        let communities = analyzer.communities().unwrap();

        assert_eq!(communities.len(), 2);
        assert_eq!(communities.community_of(0), Some(0));
        assert_eq!(communities.community_of(6), Some(1));
        assert_eq!(communities.members(1), vec![5, 6]);
        assert_eq!(communities.size(0), 5);
        assert_eq!(communities.largest(1), vec![(0, 5)]);
    }

    #[test]
    fn test_communities_of_empty_graph_fail() {
        let graph = AddressGraph::new();
        let mut analyzer = GraphAnalyzer::new(&graph);
        assert!(matches!(analyzer.communities(), Err(Error::Analysis(_))));
    }
}
