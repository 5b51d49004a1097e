use pathweave_core::{EntityId, RelationshipKind};
use serde::{Deserialize, Serialize};

/// Path confidence: `total_strength * decay^(edges - 1)`, exponent floored at 0.
pub fn confidence(total_strength: f64, edges: usize, decay: f64) -> f64 {
    let exp = edges.saturating_sub(1) as i32;
    total_strength * decay.powi(exp)
}

/// A discovered relationship path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Entity sequence from source to target inclusive.
    pub nodes: Vec<EntityId>,
    pub edge_kinds: Vec<RelationshipKind>,
    pub strengths: Vec<f64>,
    /// Product of edge strengths.
    pub total_strength: f64,
    pub confidence: f64,
}

impl PathResult {
    /// Zero-length path from a node to itself.
    pub fn trivial(id: impl Into<EntityId>) -> Self {
        Self {
            nodes: vec![id.into()],
            edge_kinds: Vec::new(),
            strengths: Vec::new(),
            total_strength: 1.0,
            confidence: 1.0,
        }
    }

    pub fn new(
        nodes: Vec<EntityId>,
        edge_kinds: Vec<RelationshipKind>,
        strengths: Vec<f64>,
        decay: f64,
    ) -> Self {
        let total_strength: f64 = strengths.iter().product();
        let confidence = confidence(total_strength, strengths.len(), decay);
        Self {
            nodes,
            edge_kinds,
            strengths,
            total_strength,
            confidence,
        }
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.strengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
    }

    /// Search cost: sum of inverted strengths.
    pub fn cost(&self) -> f64 {
        self.strengths.iter().map(|s| 1.0 / s).sum()
    }

    pub fn source(&self) -> &str {
        &self.nodes[0]
    }

    pub fn target(&self) -> &str {
        &self.nodes[self.nodes.len() - 1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    /// Connected, but not within the hop limit.
    ExceededMaxDegree,
    NoConnectivity,
    UnknownEntity,
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundReason::ExceededMaxDegree => write!(f, "exceeded_max_degree"),
            NotFoundReason::NoConnectivity => write!(f, "no_connectivity"),
            NotFoundReason::UnknownEntity => write!(f, "unknown_entity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathOutcome {
    Found { path: PathResult },
    NotFound { reason: NotFoundReason },
}

impl PathOutcome {
    pub fn path(&self) -> Option<&PathResult> {
        match self {
            PathOutcome::Found { path } => Some(path),
            PathOutcome::NotFound { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<NotFoundReason> {
        match self {
            PathOutcome::Found { .. } => None,
            PathOutcome::NotFound { reason } => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathsOutcome {
    /// Best first.
    Found { paths: Vec<PathResult> },
    NotFound { reason: NotFoundReason },
}

impl PathsOutcome {
    pub fn paths(&self) -> &[PathResult] {
        match self {
            PathsOutcome::Found { paths } => paths,
            PathsOutcome::NotFound { .. } => &[],
        }
    }
}
