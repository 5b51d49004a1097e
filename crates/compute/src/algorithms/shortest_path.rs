use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use pathweave_core::{EntityId, PathweaveError, RelationshipKind};
use pathweave_graph::{Edge, GraphStore};
use tokio_util::sync::CancellationToken;

use super::path::{NotFoundReason, PathOutcome, PathResult};

/// A priority queue entry for the hop-bounded Dijkstra.
///
/// Uses reversed ordering so `BinaryHeap` (a max-heap) behaves as a min-heap
/// on cost, breaking ties toward fewer hops.
#[derive(Debug, Clone)]
struct State {
    cost: f64,
    hops: usize,
    label: usize,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One reached (node, hop count) pair and how it was reached.
struct Label<'g> {
    node: &'g str,
    hops: usize,
    parent: Option<usize>,
    edge: Option<&'g Edge>,
}

/// Nodes and directed pairs the search must not use. Yen's algorithm fills
/// these in for spur searches; plain queries pass `Exclusions::default()`.
#[derive(Debug, Default)]
pub struct Exclusions {
    pub nodes: HashSet<EntityId>,
    pub pairs: HashSet<(EntityId, EntityId)>,
}

impl Exclusions {
    fn allows(&self, edge: &Edge) -> bool {
        !self.nodes.contains(&edge.target)
            && !self
                .pairs
                .contains(&(edge.source.clone(), edge.target.clone()))
    }
}

/// Raw search result before scoring.
#[derive(Debug, Clone)]
pub struct Hops {
    pub nodes: Vec<EntityId>,
    pub kinds: Vec<RelationshipKind>,
    pub strengths: Vec<f64>,
}

impl Hops {
    pub fn into_path(self, decay: f64) -> PathResult {
        PathResult::new(self.nodes, self.kinds, self.strengths, decay)
    }
}

/// Cheapest path from `from` to `to` using at most `max_degree` edges.
///
/// Edge cost is `1 / strength`, so strong relationships are "closer";
/// zero-strength edges are never traversed. The search runs over
/// (node, hops) states: a cheaper path that needs too many hops does not
/// hide a costlier one that fits. A state is pruned when the same node was
/// already settled with no more hops, since settled costs never decrease.
///
/// The token is checked on every pop.
pub fn hop_bounded_search(
    graph: &GraphStore,
    from: &str,
    to: &str,
    max_degree: usize,
    exclusions: &Exclusions,
    cancel: &CancellationToken,
) -> Result<Option<Hops>, PathweaveError> {
    let Some((source_id, _)) = graph.nodes.get_key_value(from) else {
        return Ok(None);
    };
    if !graph.contains(to) {
        return Ok(None);
    }

    let mut labels = vec![Label {
        node: source_id.as_str(),
        hops: 0,
        parent: None,
        edge: None,
    }];
    let mut settled: HashMap<&str, usize> = HashMap::new();
    let mut heap = BinaryHeap::new();
    heap.push(State {
        cost: 0.0,
        hops: 0,
        label: 0,
    });

    while let Some(State { cost, hops, label }) = heap.pop() {
        if cancel.is_cancelled() {
            return Err(PathweaveError::Cancelled);
        }

        let node = labels[label].node;
        if settled.get(node).is_some_and(|&h| h <= hops) {
            continue;
        }
        settled.insert(node, hops);

        if node == to {
            return Ok(Some(reconstruct(&labels, label)));
        }
        if hops >= max_degree {
            continue;
        }

        for edge in graph.out_edges(node) {
            if edge.strength <= 0.0 || !exclusions.allows(edge) {
                continue;
            }
            if settled.get(edge.target.as_str()).is_some_and(|&h| h <= hops + 1) {
                continue;
            }
            labels.push(Label {
                node: edge.target.as_str(),
                hops: hops + 1,
                parent: Some(label),
                edge: Some(edge),
            });
            heap.push(State {
                cost: cost + 1.0 / edge.strength,
                hops: hops + 1,
                label: labels.len() - 1,
            });
        }
    }

    Ok(None)
}

/// Walk parent links back to the source.
fn reconstruct(labels: &[Label<'_>], end: usize) -> Hops {
    let mut nodes = Vec::with_capacity(labels[end].hops + 1);
    let mut kinds = Vec::with_capacity(labels[end].hops);
    let mut strengths = Vec::with_capacity(labels[end].hops);

    let mut current = Some(end);
    while let Some(i) = current {
        let label = &labels[i];
        nodes.push(label.node.to_string());
        if let Some(edge) = label.edge {
            kinds.push(edge.kind);
            strengths.push(edge.strength);
        }
        current = label.parent;
    }

    nodes.reverse();
    kinds.reverse();
    strengths.reverse();
    Hops {
        nodes,
        kinds,
        strengths,
    }
}

/// Whether any path of usable edges joins `from` to `to`, ignoring hop limits.
pub fn is_connected(graph: &GraphStore, from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(from);
    queue.push_back(from);
    while let Some(node) = queue.pop_front() {
        for edge in graph.out_edges(node) {
            if edge.strength <= 0.0 {
                continue;
            }
            if edge.target == to {
                return true;
            }
            if seen.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    false
}

/// Classify why the bounded search came back empty.
pub fn not_found_reason(graph: &GraphStore, from: &str, to: &str) -> NotFoundReason {
    if !graph.contains(from) || !graph.contains(to) {
        NotFoundReason::UnknownEntity
    } else if is_connected(graph, from, to) {
        NotFoundReason::ExceededMaxDegree
    } else {
        NotFoundReason::NoConnectivity
    }
}

/// Shortest path under the hop limit, scored for strength and confidence.
pub fn shortest_path(
    graph: &GraphStore,
    from: &str,
    to: &str,
    max_degree: usize,
    decay: f64,
    cancel: &CancellationToken,
) -> Result<PathOutcome, PathweaveError> {
    if !graph.contains(from) || !graph.contains(to) {
        return Ok(PathOutcome::NotFound {
            reason: NotFoundReason::UnknownEntity,
        });
    }
    if from == to {
        return Ok(PathOutcome::Found {
            path: PathResult::trivial(from),
        });
    }

    match hop_bounded_search(graph, from, to, max_degree, &Exclusions::default(), cancel)? {
        Some(hops) => Ok(PathOutcome::Found {
            path: hops.into_path(decay),
        }),
        None => Ok(PathOutcome::NotFound {
            reason: not_found_reason(graph, from, to),
        }),
    }
}
