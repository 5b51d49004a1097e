use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant identifier as supplied by the API layer.
pub type TenantId = String;

/// Entity identifier, unique within one tenant's graph.
pub type EntityId = String;

/// Orchestrated task identifier.
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Sponsor,
    Program,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Person => write!(f, "Person"),
            EntityKind::Organization => write!(f, "Organization"),
            EntityKind::Sponsor => write!(f, "Sponsor"),
            EntityKind::Program => write!(f, "Program"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Colleague,
    Employment,
    Funding,
    Advisory,
    Collaboration,
    Membership,
    Referral,
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipKind::Colleague => write!(f, "Colleague"),
            RelationshipKind::Employment => write!(f, "Employment"),
            RelationshipKind::Funding => write!(f, "Funding"),
            RelationshipKind::Advisory => write!(f, "Advisory"),
            RelationshipKind::Collaboration => write!(f, "Collaboration"),
            RelationshipKind::Membership => write!(f, "Membership"),
            RelationshipKind::Referral => write!(f, "Referral"),
        }
    }
}

/// Caller-supplied entity record. The graph keeps a derived copy; the
/// canonical record lives with the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Free-form attributes. A `BTreeMap` keeps equality checks and
    /// serialized output deterministic.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_builder_sets_attributes() {
        let e = Entity::new("acme", EntityKind::Sponsor)
            .with_attribute("tier", serde_json::json!("gold"));
        assert_eq!(e.id, "acme");
        assert_eq!(e.attributes["tier"], serde_json::json!("gold"));
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&RelationshipKind::Funding).unwrap();
        assert_eq!(json, "\"funding\"");
        assert_eq!(EntityKind::Organization.to_string(), "Organization");
    }
}
