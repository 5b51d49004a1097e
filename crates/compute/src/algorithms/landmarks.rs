//! Landmark selection and hop-distance tables.
//!
//! Landmarks are the highest-scoring nodes under a 50/50 blend of
//! betweenness and degree centrality. For each landmark we keep BFS hop
//! distances to every node in the undirected graph; the triangle inequality
//! then bounds the hop distance between any two nodes without searching.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pathweave_core::EntityId;
use pathweave_graph::GraphStore;
use rayon::prelude::*;
use serde::Serialize;

use super::betweenness::betweenness_centrality;
use super::{Adjacency, UNREACHABLE};

const BETWEENNESS_WEIGHT: f64 = 0.5;
const DEGREE_WEIGHT: f64 = 0.5;

/// `clamp(round(nodes * ratio), min, max)`, never more than `nodes`.
pub fn landmark_count(nodes: usize, ratio: f64, min: usize, max: usize) -> usize {
    let wanted = (nodes as f64 * ratio).round() as usize;
    wanted.clamp(min, max.max(min)).min(nodes)
}

/// What the landmark tables say about the hop distance between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopBound {
    /// Hop distance is at least this.
    AtLeast(usize),
    /// Some landmark reaches exactly one of the two nodes.
    Disconnected,
}

#[derive(Debug, Clone, Serialize)]
pub struct LandmarkSummary {
    pub landmarks: Vec<EntityId>,
    pub revision: u64,
    pub computed_at: DateTime<Utc>,
}

pub struct LandmarkIndex {
    revision: u64,
    computed_at: DateTime<Utc>,
    landmarks: Vec<EntityId>,
    index: HashMap<EntityId, usize>,
    /// `tables[l][node]`: hops from landmark `l`.
    tables: Vec<Vec<usize>>,
}

impl LandmarkIndex {
    /// Select `count` landmarks from `graph` and build their distance tables.
    pub fn build(graph: &GraphStore, count: usize) -> Self {
        let adj = Adjacency::undirected(graph);
        let n = adj.len();

        let betweenness = betweenness_centrality(&adj);
        let denom = n.saturating_sub(1).max(1) as f64;
        let mut scored: Vec<(usize, f64)> = (0..n)
            .map(|i| {
                let degree = adj.neighbors[i].len() as f64 / denom;
                (i, BETWEENNESS_WEIGHT * betweenness[i] + DEGREE_WEIGHT * degree)
            })
            .collect();
        // ids are sorted, so equal scores fall back to id order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let chosen: Vec<usize> = scored.iter().take(count.min(n)).map(|(i, _)| *i).collect();
        let tables: Vec<Vec<usize>> = chosen.par_iter().map(|&l| adj.bfs(l)).collect();
        let landmarks = chosen.iter().map(|&i| adj.ids[i].clone()).collect();

        Self {
            revision: graph.revision(),
            computed_at: Utc::now(),
            landmarks,
            index: adj.index,
            tables,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Tables describe the graph at `revision`.
    pub fn is_fresh(&self, revision: u64) -> bool {
        self.revision == revision
    }

    pub fn landmarks(&self) -> &[EntityId] {
        &self.landmarks
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn summary(&self) -> LandmarkSummary {
        LandmarkSummary {
            landmarks: self.landmarks.clone(),
            revision: self.revision,
            computed_at: self.computed_at,
        }
    }

    /// `max_L |h(u,L) - h(v,L)|`. `None` when either node is not indexed.
    pub fn lower_bound(&self, u: &str, v: &str) -> Option<HopBound> {
        let (&iu, &iv) = (self.index.get(u)?, self.index.get(v)?);
        let mut bound = 0;
        for table in &self.tables {
            match (table[iu], table[iv]) {
                (UNREACHABLE, UNREACHABLE) => {}
                (UNREACHABLE, _) | (_, UNREACHABLE) => return Some(HopBound::Disconnected),
                (du, dv) => bound = bound.max(du.abs_diff(dv)),
            }
        }
        Some(HopBound::AtLeast(bound))
    }

    /// Triangulated estimate `min_L h(u,L) + h(L,v)`. An upper bound on the
    /// undirected hop distance, for diagnostics only.
    pub fn estimate(&self, u: &str, v: &str) -> Option<usize> {
        let (&iu, &iv) = (self.index.get(u)?, self.index.get(v)?);
        self.tables
            .iter()
            .filter(|t| t[iu] != UNREACHABLE && t[iv] != UNREACHABLE)
            .map(|t| t[iu] + t[iv])
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::fixtures::{chain, graph};
    use pathweave_core::{Entity, EntityKind};

    #[test]
    fn count_is_clamped() {
        assert_eq!(landmark_count(10, 0.05, 2, 32), 2);
        assert_eq!(landmark_count(200, 0.05, 2, 32), 10);
        assert_eq!(landmark_count(10_000, 0.05, 2, 32), 32);
        assert_eq!(landmark_count(1, 0.05, 2, 32), 1);
        assert_eq!(landmark_count(0, 0.05, 2, 32), 0);
    }

    #[test]
    fn hub_is_chosen_first() {
        let g = graph(&[
            ("hub", "a", 0.5),
            ("hub", "b", 0.5),
            ("hub", "c", 0.5),
            ("c", "d", 0.5),
        ]);
        let idx = LandmarkIndex::build(&g, 1);
        assert_eq!(idx.landmarks(), ["hub".to_string()]);
        assert!(idx.is_fresh(g.revision()));
    }

    #[test]
    fn lower_bound_never_exceeds_true_distance() {
        let g = chain(10, 0.9);
        let idx = LandmarkIndex::build(&g, 3);
        for i in 0..=10usize {
            for j in 0..=10usize {
                let (u, v) = (format!("n{}", i), format!("n{}", j));
                match idx.lower_bound(&u, &v) {
                    Some(HopBound::AtLeast(b)) => assert!(b <= i.abs_diff(j)),
                    other => panic!("unexpected bound {:?}", other),
                }
                let est = idx.estimate(&u, &v).unwrap();
                assert!(est >= i.abs_diff(j));
            }
        }
    }

    #[test]
    fn chain_end_to_end_bound_is_tight_from_endpoint_landmark() {
        let g = chain(10, 0.9);
        let idx = LandmarkIndex::build(&g, 10);
        // with (nearly) every node a landmark, n0 or n10 is among them
        assert_eq!(idx.lower_bound("n0", "n10"), Some(HopBound::AtLeast(10)));
    }

    #[test]
    fn split_graph_is_detected() {
        let mut g = graph(&[("a", "b", 0.5), ("b", "c", 0.5), ("x", "y", 0.5)]);
        g.upsert_entity(&Entity::new("solo", EntityKind::Sponsor));
        let idx = LandmarkIndex::build(&g, 1);
        assert_eq!(idx.landmarks(), ["b".to_string()]);
        assert_eq!(idx.lower_bound("a", "x"), Some(HopBound::Disconnected));
        assert_eq!(idx.lower_bound("ghost", "a"), None);
        assert_eq!(idx.estimate("a", "x"), None);
    }

    #[test]
    fn mutation_makes_index_stale() {
        let mut g = chain(3, 0.9);
        let idx = LandmarkIndex::build(&g, 2);
        g.upsert_entity(&Entity::new("late", EntityKind::Person));
        assert!(!idx.is_fresh(g.revision()));
    }
}
