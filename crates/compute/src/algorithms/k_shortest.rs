use pathweave_core::{PathweaveError, RelationshipKind};
use pathweave_graph::GraphStore;
use tokio_util::sync::CancellationToken;

use super::path::PathResult;
use super::shortest_path::{hop_bounded_search, Exclusions, Hops};

/// Up to `k` loop-free paths from `from` to `to`, each within `max_degree`
/// edges, using Yen's algorithm over the hop-bounded search.
///
/// Candidates are generated in cost order; the returned list is ranked by
/// confidence (descending), ties broken by fewer edges. Endpoints are
/// assumed to exist and differ.
pub fn k_shortest_paths(
    graph: &GraphStore,
    from: &str,
    to: &str,
    k: usize,
    max_degree: usize,
    decay: f64,
    cancel: &CancellationToken,
) -> Result<Vec<PathResult>, PathweaveError> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let Some(first) = hop_bounded_search(graph, from, to, max_degree, &Exclusions::default(), cancel)?
    else {
        return Ok(Vec::new());
    };

    let mut accepted: Vec<Hops> = vec![first];
    let mut candidates: Vec<(f64, Hops)> = Vec::new();

    while accepted.len() < k {
        let prev = accepted[accepted.len() - 1].clone();

        for spur_index in 0..prev.nodes.len() - 1 {
            if cancel.is_cancelled() {
                return Err(PathweaveError::Cancelled);
            }
            let root = &prev.nodes[..=spur_index];
            let spur_node = &prev.nodes[spur_index];

            let mut exclusions = Exclusions::default();
            for p in &accepted {
                if p.nodes.len() > spur_index + 1 && &p.nodes[..=spur_index] == root {
                    exclusions
                        .pairs
                        .insert((p.nodes[spur_index].clone(), p.nodes[spur_index + 1].clone()));
                }
            }
            exclusions.nodes.extend(root[..spur_index].iter().cloned());

            let budget = max_degree - spur_index;
            let Some(spur) = hop_bounded_search(graph, spur_node, to, budget, &exclusions, cancel)?
            else {
                continue;
            };

            let candidate = join(&prev, spur_index, spur);
            let known = accepted.iter().any(|p| p.nodes == candidate.nodes)
                || candidates.iter().any(|(_, c)| c.nodes == candidate.nodes);
            if !known {
                candidates.push((cost(&candidate.strengths), candidate));
            }
        }

        if candidates.is_empty() {
            break;
        }
        let best = candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.0.total_cmp(&b.0)
                    .then_with(|| a.1.nodes.len().cmp(&b.1.nodes.len()))
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        accepted.push(candidates.swap_remove(best).1);
    }

    let mut paths: Vec<PathResult> = accepted.into_iter().map(|h| h.into_path(decay)).collect();
    paths.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.len().cmp(&b.len()))
    });
    Ok(paths)
}

fn cost(strengths: &[f64]) -> f64 {
    strengths.iter().map(|s| 1.0 / s).sum()
}

/// Root of `prev` up to `spur_index` followed by the spur path.
fn join(prev: &Hops, spur_index: usize, spur: Hops) -> Hops {
    let mut nodes = prev.nodes[..spur_index].to_vec();
    nodes.extend(spur.nodes);
    let mut kinds: Vec<RelationshipKind> = prev.kinds[..spur_index].to_vec();
    kinds.extend(spur.kinds);
    let mut strengths = prev.strengths[..spur_index].to_vec();
    strengths.extend(spur.strengths);
    Hops {
        nodes,
        kinds,
        strengths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::fixtures::graph;
    use std::collections::HashSet;

    fn run(g: &GraphStore, k: usize, max: usize) -> Vec<PathResult> {
        k_shortest_paths(g, "a", "d", k, max, 0.9, &CancellationToken::new()).unwrap()
    }

    fn three_routes() -> GraphStore {
        // a-b-d strong, a-c-d medium, a-e-f-d weak and long
        graph(&[
            ("a", "b", 0.9),
            ("b", "d", 0.9),
            ("a", "c", 0.6),
            ("c", "d", 0.6),
            ("a", "e", 0.5),
            ("e", "f", 0.5),
            ("f", "d", 0.5),
        ])
    }

    #[test]
    fn finds_distinct_routes_ranked_by_confidence() {
        let g = three_routes();
        let paths = run(&g, 3, 7);
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0].nodes, vec!["a", "b", "d"]);
        assert_eq!(paths[1].nodes, vec!["a", "c", "d"]);
        assert_eq!(paths[2].nodes, vec!["a", "e", "f", "d"]);
        assert!(paths.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn paths_are_simple_and_unique() {
        let g = three_routes();
        let paths = run(&g, 10, 7);
        let mut seen = HashSet::new();
        for p in &paths {
            let unique: HashSet<_> = p.nodes.iter().collect();
            assert_eq!(unique.len(), p.nodes.len(), "loop in {:?}", p.nodes);
            assert!(seen.insert(p.nodes.clone()));
            assert_eq!(p.source(), "a");
            assert_eq!(p.target(), "d");
        }
    }

    #[test]
    fn respects_hop_limit() {
        let g = three_routes();
        let paths = run(&g, 5, 2);
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.len() <= 2));
        assert!(!paths.iter().any(|p| p.nodes == vec!["a", "e", "f", "d"]));
    }

    #[test]
    fn k_of_one_is_the_shortest_path() {
        let g = three_routes();
        let paths = run(&g, 1, 7);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec!["a", "b", "d"]);
    }

    #[test]
    fn no_route_yields_nothing() {
        let g = graph(&[("a", "b", 0.9), ("c", "d", 0.9)]);
        assert!(run(&g, 3, 7).is_empty());
    }
}
