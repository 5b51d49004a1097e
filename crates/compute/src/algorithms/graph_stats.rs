use std::collections::HashSet;

use pathweave_graph::GraphStore;
use serde::{Deserialize, Serialize};

use super::Adjacency;

/// Structural summary of one tenant graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatistics {
    pub nodes: usize,
    /// Explicit relationships; inferred reverse edges are not counted.
    pub edges: usize,
    /// All stored directed edges, inferred included.
    pub directed_edges: usize,
    /// Connected unordered pairs over possible pairs.
    pub density: f64,
    pub components: usize,
    /// Mean local clustering coefficient. Omitted when analytics run degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_clustering: Option<f64>,
}

/// Compute network statistics; clustering only when `with_clustering`.
pub fn network_statistics(graph: &GraphStore, with_clustering: bool) -> NetworkStatistics {
    let nodes = graph.node_count();
    if nodes == 0 {
        return NetworkStatistics::default();
    }

    let adj = Adjacency::undirected(graph);
    let pairs = adj.pair_count();

    // Density: 2*E / (N*(N-1)) for undirected interpretation
    let density = if nodes > 1 {
        (2.0 * pairs as f64) / (nodes as f64 * (nodes as f64 - 1.0))
    } else {
        0.0
    };

    NetworkStatistics {
        nodes,
        edges: graph.explicit_edge_count(),
        directed_edges: graph.edge_count(),
        density,
        components: count_connected_components(&adj),
        average_clustering: with_clustering.then(|| average_clustering(&adj)),
    }
}

/// Union-Find (disjoint set) with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Count connected components treating edges as undirected.
fn count_connected_components(adj: &Adjacency) -> usize {
    let n = adj.len();
    let mut uf = UnionFind::new(n);
    for (a, list) in adj.neighbors.iter().enumerate() {
        for &b in list {
            uf.union(a, b);
        }
    }

    let mut roots = HashSet::new();
    for i in 0..n {
        roots.insert(uf.find(i));
    }
    roots.len()
}

/// Mean of local clustering coefficients; nodes with fewer than two
/// neighbors contribute 0.
fn average_clustering(adj: &Adjacency) -> f64 {
    if adj.is_empty() {
        return 0.0;
    }
    let total: f64 = (0..adj.len())
        .map(|v| {
            let nbrs = &adj.neighbors[v];
            let k = nbrs.len();
            if k < 2 {
                return 0.0;
            }
            let mut links = 0usize;
            for (i, &a) in nbrs.iter().enumerate() {
                for &b in &nbrs[i + 1..] {
                    if adj.neighbors[a].binary_search(&b).is_ok() {
                        links += 1;
                    }
                }
            }
            2.0 * links as f64 / (k * (k - 1)) as f64
        })
        .sum();
    total / adj.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::fixtures::graph;
    use pathweave_core::{Entity, EntityKind};

    fn triangle() -> GraphStore {
        graph(&[("alice", "bob", 0.9), ("bob", "carol", 0.5), ("carol", "alice", 0.7)])
    }

    #[test]
    fn stats_basic_counts() {
        let stats = network_statistics(&triangle(), true);
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.directed_edges, 6);
    }

    #[test]
    fn stats_single_component() {
        assert_eq!(network_statistics(&triangle(), true).components, 1);
    }

    #[test]
    fn stats_multiple_components() {
        let mut g = graph(&[("a", "b", 0.5), ("c", "d", 0.5)]);
        g.upsert_entity(&Entity::new("e", EntityKind::Program));

        let stats = network_statistics(&g, true);
        assert_eq!(stats.components, 3);
        assert_eq!(stats.nodes, 5);
        assert_eq!(stats.edges, 2);
    }

    #[test]
    fn stats_density() {
        // 3 nodes, 3 pairs: density = 2*3 / (3*2) = 1.0
        let stats = network_statistics(&triangle(), true);
        assert!((stats.density - 1.0).abs() < 1e-10);

        let line = graph(&[("a", "b", 0.5), ("b", "c", 0.5)]);
        let stats = network_statistics(&line, true);
        assert!((stats.density - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn stats_clustering() {
        let stats = network_statistics(&triangle(), true);
        assert_eq!(stats.average_clustering, Some(1.0));

        let line = graph(&[("a", "b", 0.5), ("b", "c", 0.5)]);
        assert_eq!(network_statistics(&line, true).average_clustering, Some(0.0));
        assert_eq!(network_statistics(&line, false).average_clustering, None);
    }

    #[test]
    fn stats_empty_graph() {
        let stats = network_statistics(&GraphStore::new(), true);
        assert_eq!(stats, NetworkStatistics::default());
        assert_eq!(stats.components, 0);
        assert_eq!(stats.density, 0.0);
    }
}
