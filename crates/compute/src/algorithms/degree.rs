use std::collections::HashMap;

use pathweave_core::EntityId;
use pathweave_graph::GraphStore;
use serde::Serialize;

use super::Adjacency;

/// Degree information for a single node.
#[derive(Debug, Clone, Serialize)]
pub struct DegreeInfo {
    pub in_deg: usize,
    pub out_deg: usize,
    /// Distinct undirected neighbors.
    pub neighbors: usize,
    /// `neighbors / (n - 1)`, in [0, 1].
    pub centrality: f64,
}

/// Compute in-degree, out-degree and normalized degree centrality for
/// every node.
pub fn degree_centrality(graph: &GraphStore) -> HashMap<EntityId, DegreeInfo> {
    let adj = Adjacency::undirected(graph);
    let denom = adj.len().saturating_sub(1).max(1) as f64;

    adj.ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let in_deg = graph.incoming.get(id).map_or(0, |v| v.len());
            let out_deg = graph.outgoing.get(id).map_or(0, |v| v.len());
            let neighbors = adj.neighbors[i].len();
            (
                id.clone(),
                DegreeInfo {
                    in_deg,
                    out_deg,
                    neighbors,
                    centrality: neighbors as f64 / denom,
                },
            )
        })
        .collect()
}

/// Normalized degree centrality of one node; 0.0 if absent.
pub fn node_degree_centrality(graph: &GraphStore, id: &str) -> f64 {
    let n = graph.node_count();
    if n < 2 || !graph.contains(id) {
        return 0.0;
    }
    let mut neighbors: Vec<&str> = graph
        .out_edges(id)
        .map(|e| e.target.as_str())
        .chain(graph.in_edges(id).map(|e| e.source.as_str()))
        .collect();
    neighbors.sort_unstable();
    neighbors.dedup();
    neighbors.len() as f64 / (n - 1) as f64
}
