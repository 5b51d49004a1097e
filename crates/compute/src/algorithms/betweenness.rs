use std::collections::VecDeque;

use rayon::prelude::*;

use super::{Adjacency, UNREACHABLE};

/// Normalized betweenness centrality over the undirected hop graph
/// (Brandes). Indexed like `adj.ids`, values in [0, 1].
///
/// Each source's dependency accumulation is independent, so sources are
/// processed in parallel and the partial scores summed.
pub fn betweenness_centrality(adj: &Adjacency) -> Vec<f64> {
    let n = adj.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let raw = (0..n)
        .into_par_iter()
        .map(|s| single_source_dependencies(adj, s))
        .reduce(
            || vec![0.0; n],
            |mut acc, part| {
                for (a, p) in acc.iter_mut().zip(part) {
                    *a += p;
                }
                acc
            },
        );

    // each unordered pair is counted from both ends
    let pairs = ((n - 1) * (n - 2)) as f64;
    raw.into_iter().map(|v| v / pairs).collect()
}

fn single_source_dependencies(adj: &Adjacency, s: usize) -> Vec<f64> {
    let n = adj.len();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![UNREACHABLE; n];
    let mut queue = VecDeque::new();

    sigma[s] = 1.0;
    dist[s] = 0;
    queue.push_back(s);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in &adj.neighbors[v] {
            if dist[w] == UNREACHABLE {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
    }
    delta[s] = 0.0;
    delta
}
