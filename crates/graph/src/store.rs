use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pathweave_core::{Entity, EntityId, EntityKind, PathweaveError, RelationshipKind};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

pub type EdgeId = Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: EntityId,
    pub kind: EntityKind,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    fn matches(&self, entity: &Entity) -> bool {
        self.kind == entity.kind && self.attributes == entity.attributes
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,
    /// In [0, 1].
    pub strength: f64,
    /// Auto-inserted reverse of an explicit relationship.
    pub inferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub explicit_edge_count: usize,
    pub nodes_by_kind: HashMap<String, usize>,
    pub edges_by_kind: HashMap<String, usize>,
}

/// Directed, weighted graph for one tenant.
///
/// Every explicit relationship `a -> b` is paired with an inferred `b -> a`
/// at reduced strength, so traversal only ever follows `outgoing`.
pub struct GraphStore {
    pub nodes: HashMap<EntityId, Node>,
    edge_dedup: HashMap<(EntityId, EntityId, RelationshipKind), EdgeId>,
    pub edges: HashMap<EdgeId, Edge>,
    pub outgoing: HashMap<EntityId, Vec<EdgeId>>,
    pub incoming: HashMap<EntityId, Vec<EdgeId>>,
    revision: u64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edge_dedup: HashMap::new(),
            edges: HashMap::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
            revision: 0,
        }
    }

    /// Topology revision. Bumped whenever a node or edge is added, so derived
    /// hop tables can detect that they are stale.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn upsert_entity(&mut self, entity: &Entity) -> UpsertOutcome {
        let now = Utc::now();
        if let Some(node) = self.nodes.get_mut(&entity.id) {
            if node.matches(entity) {
                return UpsertOutcome::Unchanged;
            }
            node.kind = entity.kind;
            node.attributes = entity.attributes.clone();
            node.updated_at = now;
            return UpsertOutcome::Updated;
        }

        let node = Node {
            id: entity.id.clone(),
            kind: entity.kind,
            attributes: entity.attributes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.nodes.insert(entity.id.clone(), node);
        self.revision += 1;
        UpsertOutcome::Inserted
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Insert `source -> target` and its inferred reverse at
    /// `strength * asymmetry`. Re-adding an existing (source, target, kind)
    /// updates it in place.
    pub fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        strength: f64,
        asymmetry: f64,
        metadata: Option<serde_json::Value>,
    ) -> Result<EdgeId, PathweaveError> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(PathweaveError::validation(format!(
                "strength must be within [0, 1], got {}",
                strength
            )));
        }
        if source == target {
            return Err(PathweaveError::validation(format!(
                "self-relationship on '{}'",
                source
            )));
        }
        for endpoint in [source, target] {
            if !self.contains(endpoint) {
                return Err(PathweaveError::validation(format!(
                    "unknown entity '{}'",
                    endpoint
                )));
            }
        }

        let forward = self.put_edge(source, target, kind, strength, false, metadata);
        self.put_edge(target, source, kind, strength * asymmetry, true, None);
        Ok(forward)
    }

    fn put_edge(
        &mut self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        strength: f64,
        inferred: bool,
        metadata: Option<serde_json::Value>,
    ) -> EdgeId {
        let now = Utc::now();
        let dedup_key = (source.to_string(), target.to_string(), kind);

        if let Some(&existing_id) = self.edge_dedup.get(&dedup_key) {
            if let Some(edge) = self.edges.get_mut(&existing_id) {
                // an inferred edge never overwrites an explicit one
                if inferred && !edge.inferred {
                    return existing_id;
                }
                edge.strength = strength;
                edge.inferred = inferred;
                if metadata.is_some() {
                    edge.metadata = metadata;
                }
                edge.updated_at = now;
                return existing_id;
            }
        }

        let id = Uuid::new_v4();
        let edge = Edge {
            id,
            source: source.to_string(),
            target: target.to_string(),
            kind,
            strength,
            inferred,
            metadata,
            created_at: now,
            updated_at: now,
        };

        self.edges.insert(id, edge);
        self.edge_dedup.insert(dedup_key, id);
        self.outgoing.entry(source.to_string()).or_default().push(id);
        self.incoming.entry(target.to_string()).or_default().push(id);
        self.revision += 1;
        id
    }

    /// Edge `source -> target` of any kind with the highest strength.
    pub fn strongest_edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.out_edges(source)
            .filter(|e| e.target == target)
            .max_by(|a, b| a.strength.total_cmp(&b.strength))
    }

    pub fn out_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edges.get(eid))
    }

    pub fn in_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edges.get(eid))
    }

    /// Outgoing neighbors with the connecting edge.
    pub fn neighbors(&self, id: &str) -> Vec<(&Edge, &Node)> {
        self.out_edges(id)
            .filter_map(|edge| self.nodes.get(&edge.target).map(|node| (edge, node)))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn explicit_edge_count(&self) -> usize {
        self.edges.values().filter(|e| !e.inferred).count()
    }

    /// Release spare capacity held by the internal maps.
    pub fn shrink(&mut self) {
        self.nodes.shrink_to_fit();
        self.edges.shrink_to_fit();
        self.edge_dedup.shrink_to_fit();
        self.outgoing.shrink_to_fit();
        self.incoming.shrink_to_fit();
        for ids in self.outgoing.values_mut().chain(self.incoming.values_mut()) {
            ids.shrink_to_fit();
        }
        debug!(nodes = self.nodes.len(), edges = self.edges.len(), "graph store shrunk");
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind: HashMap<String, usize> = HashMap::new();
        for node in self.nodes.values() {
            *nodes_by_kind.entry(node.kind.to_string()).or_default() += 1;
        }

        let mut edges_by_kind: HashMap<String, usize> = HashMap::new();
        for edge in self.edges.values().filter(|e| !e.inferred) {
            *edges_by_kind.entry(edge.kind.to_string()).or_default() += 1;
        }

        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            explicit_edge_count: self.explicit_edge_count(),
            nodes_by_kind,
            edges_by_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person(id: &str) -> Entity {
        Entity::new(id, EntityKind::Person)
    }

    fn two_people() -> GraphStore {
        let mut g = GraphStore::new();
        g.upsert_entity(&person("alice"));
        g.upsert_entity(&person("bob"));
        g
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut g = GraphStore::new();
        assert_eq!(g.upsert_entity(&person("alice")), UpsertOutcome::Inserted);
        assert_eq!(g.upsert_entity(&person("alice")), UpsertOutcome::Unchanged);
        assert_eq!(g.node_count(), 1);

        let updated = person("alice").with_attribute("title", json!("PI"));
        assert_eq!(g.upsert_entity(&updated), UpsertOutcome::Updated);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.get("alice").unwrap().attributes["title"], json!("PI"));
    }

    #[test]
    fn relationship_inserts_weaker_reverse() {
        let mut g = two_people();
        g.add_relationship("alice", "bob", RelationshipKind::Colleague, 0.9, 0.8, None)
            .unwrap();

        let fwd = g.strongest_edge("alice", "bob").unwrap();
        let rev = g.strongest_edge("bob", "alice").unwrap();
        assert!(!fwd.inferred);
        assert!(rev.inferred);
        assert!((rev.strength - 0.72).abs() < 1e-9);
        assert!(rev.strength < fwd.strength);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.explicit_edge_count(), 1);
    }

    #[test]
    fn explicit_reverse_replaces_inferred() {
        let mut g = two_people();
        g.add_relationship("alice", "bob", RelationshipKind::Colleague, 0.9, 0.8, None)
            .unwrap();
        g.add_relationship("bob", "alice", RelationshipKind::Colleague, 0.5, 0.8, None)
            .unwrap();

        let ab = g.strongest_edge("alice", "bob").unwrap();
        let ba = g.strongest_edge("bob", "alice").unwrap();
        // the second call's inferred a->b must not clobber the explicit 0.9
        assert!((ab.strength - 0.9).abs() < 1e-9);
        assert!(!ab.inferred);
        assert!((ba.strength - 0.5).abs() < 1e-9);
        assert!(!ba.inferred);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn readding_updates_in_place() {
        let mut g = two_people();
        let first = g
            .add_relationship("alice", "bob", RelationshipKind::Funding, 0.4, 0.8, None)
            .unwrap();
        let rev = g.revision();
        let second = g
            .add_relationship(
                "alice",
                "bob",
                RelationshipKind::Funding,
                0.6,
                0.8,
                Some(json!({"grant": "G-1"})),
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.revision(), rev);
        let e = &g.edges[&first];
        assert!((e.strength - 0.6).abs() < 1e-9);
        assert_eq!(e.metadata.as_ref().unwrap()["grant"], json!("G-1"));
    }

    #[test]
    fn rejects_invalid_relationships() {
        let mut g = two_people();
        for s in [-0.1, 1.5, f64::NAN] {
            let err = g
                .add_relationship("alice", "bob", RelationshipKind::Colleague, s, 0.8, None)
                .unwrap_err();
            assert!(matches!(err, PathweaveError::Validation(_)));
        }
        assert!(g
            .add_relationship("alice", "alice", RelationshipKind::Colleague, 0.5, 0.8, None)
            .is_err());
        assert!(g
            .add_relationship("alice", "zed", RelationshipKind::Colleague, 0.5, 0.8, None)
            .is_err());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn neighbors_follow_outgoing() {
        let mut g = two_people();
        g.upsert_entity(&Entity::new("acme", EntityKind::Sponsor));
        g.add_relationship("alice", "bob", RelationshipKind::Colleague, 0.9, 0.8, None)
            .unwrap();
        g.add_relationship("alice", "acme", RelationshipKind::Funding, 0.7, 0.8, None)
            .unwrap();

        let mut ids: Vec<_> = g.neighbors("alice").iter().map(|(_, n)| n.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["acme".to_string(), "bob".to_string()]);
        assert_eq!(g.in_edges("alice").count(), 2);

        let stats = g.stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.explicit_edge_count, 2);
        assert_eq!(stats.edges_by_kind["Funding"], 1);
        assert_eq!(stats.nodes_by_kind["Person"], 2);
    }
}
