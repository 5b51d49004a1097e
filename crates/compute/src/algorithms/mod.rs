pub mod betweenness;
pub mod degree;
pub mod graph_stats;
pub mod k_shortest;
pub mod landmarks;
pub mod path;
pub mod quality;
pub mod shortest_path;

use std::collections::{HashMap, VecDeque};

use pathweave_core::EntityId;
use pathweave_graph::GraphStore;

/// Hop distance marker for unreachable nodes.
pub const UNREACHABLE: usize = usize::MAX;

/// Dense, undirected view of a [`GraphStore`].
///
/// Node ids are sorted so indices (and anything derived from them) are
/// deterministic across runs. Neighbor lists are deduplicated: parallel
/// edges of different kinds and the inferred reverse collapse to one pair.
pub struct Adjacency {
    pub ids: Vec<EntityId>,
    pub index: HashMap<EntityId, usize>,
    pub neighbors: Vec<Vec<usize>>,
}

impl Adjacency {
    pub fn undirected(graph: &GraphStore) -> Self {
        let mut ids: Vec<EntityId> = graph.nodes.keys().cloned().collect();
        ids.sort();
        let index: HashMap<EntityId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut neighbors = vec![Vec::new(); ids.len()];
        for edge in graph.edges.values() {
            if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
                neighbors[a].push(b);
                neighbors[b].push(a);
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            ids,
            index,
            neighbors,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of distinct unordered connected pairs.
    pub fn pair_count(&self) -> usize {
        self.neighbors.iter().map(|n| n.len()).sum::<usize>() / 2
    }

    /// BFS hop distances from `start`; [`UNREACHABLE`] where unreachable.
    pub fn bfs(&self, start: usize) -> Vec<usize> {
        let mut dist = vec![UNREACHABLE; self.len()];
        let mut queue = VecDeque::new();
        dist[start] = 0;
        queue.push_back(start);
        while let Some(u) = queue.pop_front() {
            for &v in &self.neighbors[u] {
                if dist[v] == UNREACHABLE {
                    dist[v] = dist[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        dist
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_collapses_reverse_edges() {
        let g = fixtures::graph(&[("a", "b", 0.9), ("b", "c", 0.5)]);
        let adj = Adjacency::undirected(&g);
        assert_eq!(adj.ids, vec!["a", "b", "c"]);
        assert_eq!(adj.neighbors[adj.index["b"]], vec![0, 2]);
        assert_eq!(adj.pair_count(), 2);
    }

    #[test]
    fn bfs_marks_unreachable() {
        let mut g = fixtures::graph(&[("a", "b", 0.9)]);
        g.upsert_entity(&pathweave_core::Entity::new("z", pathweave_core::EntityKind::Sponsor));
        let adj = Adjacency::undirected(&g);
        let d = adj.bfs(adj.index["a"]);
        assert_eq!(d[adj.index["b"]], 1);
        assert_eq!(d[adj.index["z"]], UNREACHABLE);
    }
}
