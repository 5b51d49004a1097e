use std::sync::Arc;

use chrono::Utc;
use pathweave_core::config::{GraphConfig, ResourceConfig};
use pathweave_core::{Entity, EntityKind, Feature, PathweaveError, PressureLevel, RelationshipKind};
use pathweave_resource::{FeatureFlagRegistry, ResourceReading, SnapshotHistory};

use super::*;
use crate::algorithms::quality::QualityBand;

const T: &str = "tenant-a";

fn setup(config: GraphConfig) -> (TenantGraphs, Arc<FeatureFlagRegistry>) {
    let registry = Arc::new(FeatureFlagRegistry::new(&ResourceConfig::default()));
    (TenantGraphs::new(config, Arc::clone(&registry)), registry)
}

fn pressure(registry: &FeatureFlagRegistry, cpu: f64, memory: f64) -> PressureLevel {
    let mut h = SnapshotHistory::new(1);
    let snap = h.push(ResourceReading::new(cpu, memory, 0.0), Utc::now());
    registry.observe(&snap).to
}

fn person(graphs: &TenantGraphs, id: &str) {
    graphs.add_entity(T, &Entity::new(id, EntityKind::Person)).unwrap();
}

fn link(graphs: &TenantGraphs, a: &str, b: &str, s: f64) {
    graphs
        .add_relationship(T, a, b, RelationshipKind::Colleague, s, None)
        .unwrap();
}

fn chain(graphs: &TenantGraphs, len: usize) {
    for i in 0..=len {
        person(graphs, &format!("n{}", i));
    }
    for i in 0..len {
        link(graphs, &format!("n{}", i), &format!("n{}", i + 1), 0.9);
    }
}

#[test]
fn weakest_link_path_is_fair() {
    let (graphs, _) = setup(GraphConfig::default());
    for id in ["A", "B", "C", "D"] {
        person(&graphs, id);
    }
    link(&graphs, "A", "B", 0.9);
    link(&graphs, "B", "C", 0.6);
    link(&graphs, "C", "D", 0.8);

    let outcome = graphs.find_shortest_path(T, "A", "D", Some(7)).unwrap();
    let path = outcome.path().unwrap();
    assert_eq!(path.nodes, vec!["A", "B", "C", "D"]);

    let q = graphs.analyze_path_quality(path);
    assert!((q.average_strength - 0.7667).abs() < 1e-4);
    assert!((q.minimum_strength - 0.6).abs() < 1e-9);
    assert_eq!(q.quality, QualityBand::Fair);
}

#[test]
fn add_entity_is_idempotent() {
    let (graphs, _) = setup(GraphConfig::default());
    let e = Entity::new("acme", EntityKind::Sponsor);
    assert!(graphs.add_entity(T, &e).unwrap());
    assert!(!graphs.add_entity(T, &e).unwrap());
    assert_eq!(graphs.entity_ids(T).unwrap(), vec!["acme"]);
}

#[test]
fn rejects_empty_ids() {
    let (graphs, _) = setup(GraphConfig::default());
    assert!(graphs.add_entity("", &Entity::new("x", EntityKind::Person)).is_err());
    assert!(graphs.add_entity(T, &Entity::new("", EntityKind::Person)).is_err());
}

#[test]
fn relationship_in_unknown_tenant_is_invalid() {
    let (graphs, _) = setup(GraphConfig::default());
    let err = graphs
        .add_relationship("nobody", "a", "b", RelationshipKind::Funding, 0.5, None)
        .unwrap_err();
    assert!(matches!(err, PathweaveError::Validation(_)));
}

#[test]
fn tenants_are_isolated() {
    let (graphs, _) = setup(GraphConfig::default());
    person(&graphs, "alice");
    graphs
        .add_entity("tenant-b", &Entity::new("bob", EntityKind::Person))
        .unwrap();

    assert!(graphs.get_entity(T, "alice").unwrap().is_some());
    assert!(graphs.get_entity("tenant-b", "alice").unwrap().is_none());
    assert_eq!(graphs.tenant_ids().unwrap(), vec!["tenant-a", "tenant-b"]);
    assert_eq!(
        graphs.find_shortest_path("tenant-b", "bob", "alice", None).unwrap().reason(),
        Some(NotFoundReason::UnknownEntity)
    );
}

#[test]
fn unknown_tenant_path_is_unknown_entity() {
    let (graphs, _) = setup(GraphConfig::default());
    let outcome = graphs.find_shortest_path("ghost", "a", "b", None).unwrap();
    assert_eq!(outcome.reason(), Some(NotFoundReason::UnknownEntity));
}

#[test]
fn emergency_caps_path_degree() {
    let (graphs, registry) = setup(GraphConfig::default());
    chain(&graphs, 5);

    assert!(graphs.find_shortest_path(T, "n0", "n5", None).unwrap().path().is_some());

    assert_eq!(pressure(&registry, 96.0, 10.0), PressureLevel::Emergency);
    let outcome = graphs.find_shortest_path(T, "n0", "n5", None).unwrap();
    assert_eq!(outcome.reason(), Some(NotFoundReason::ExceededMaxDegree));
    let outcome = graphs.find_shortest_path(T, "n0", "n4", None).unwrap();
    assert_eq!(outcome.path().unwrap().len(), 4);
}

#[test]
fn k_shortest_is_gated_and_capped() {
    let (graphs, registry) = setup(GraphConfig::default());
    for id in ["a", "b", "c", "d", "e", "f", "g"] {
        person(&graphs, id);
    }
    for mid in ["b", "c", "e", "f", "g"] {
        link(&graphs, "a", mid, 0.8);
        link(&graphs, mid, "d", 0.8);
    }

    let err = graphs.find_k_shortest_paths(T, "a", "d", 0, None).unwrap_err();
    assert!(matches!(err, PathweaveError::Validation(_)));

    assert_eq!(graphs.find_k_shortest_paths(T, "a", "d", 5, None).unwrap().paths().len(), 5);

    pressure(&registry, 10.0, 80.0);
    assert_eq!(graphs.find_k_shortest_paths(T, "a", "d", 5, None).unwrap().paths().len(), 3);

    pressure(&registry, 10.0, 91.0);
    let err = graphs.find_k_shortest_paths(T, "a", "d", 5, None).unwrap_err();
    assert_eq!(
        err,
        PathweaveError::FeatureDisabled {
            feature: Feature::AdvancedAnalytics,
            level: PressureLevel::Critical,
        }
    );
}

#[test]
fn statistics_for_unknown_tenant_are_zero() {
    let (graphs, _) = setup(GraphConfig::default());
    let stats = graphs.network_statistics("ghost").unwrap();
    assert_eq!(stats.nodes, 0);
    assert_eq!(stats.edges, 0);
    assert_eq!(stats.density, 0.0);
    assert_eq!(stats.components, 0);
}

#[test]
fn statistics_follow_analytics_state() {
    let (graphs, registry) = setup(GraphConfig::default());
    for id in ["a", "b", "c"] {
        person(&graphs, id);
    }
    link(&graphs, "a", "b", 0.5);
    link(&graphs, "b", "c", 0.5);
    link(&graphs, "c", "a", 0.5);

    let stats = graphs.network_statistics(T).unwrap();
    assert_eq!(stats.edges, 3);
    assert_eq!(stats.average_clustering, Some(1.0));

    pressure(&registry, 80.0, 10.0);
    assert_eq!(graphs.network_statistics(T).unwrap().average_clustering, None);

    pressure(&registry, 90.0, 10.0);
    assert!(graphs.network_statistics(T).is_err());
}

fn small_interval() -> GraphConfig {
    GraphConfig {
        landmark_interval: 5,
        ..GraphConfig::default()
    }
}

#[test]
fn landmarks_recompute_at_watermark() {
    let (graphs, _) = setup(small_interval());
    for i in 0..4 {
        person(&graphs, &format!("p{}", i));
    }
    assert!(graphs.landmark_summary(T).unwrap().is_none());

    person(&graphs, "p4");
    let summary = graphs.landmark_summary(T).unwrap().expect("watermark reached");
    assert_eq!(summary.landmarks.len(), 2);

    // any topology change makes the tables stale
    link(&graphs, "p0", "p1", 0.5);
    assert!(graphs.landmark_summary(T).unwrap().is_none());
}

#[test]
fn landmark_refresh_deferred_while_disabled() {
    let (graphs, registry) = setup(small_interval());
    pressure(&registry, 10.0, 92.0);
    for i in 0..5 {
        person(&graphs, &format!("p{}", i));
    }
    assert!(graphs.landmark_summary(T).unwrap().is_none());
    assert!(matches!(
        graphs.recompute_landmarks(T),
        Err(PathweaveError::FeatureDisabled { .. })
    ));

    // the watermark moved on, so further growth does not retry the build
    pressure(&registry, 10.0, 50.0);
    person(&graphs, "p5");
    assert!(graphs.landmark_summary(T).unwrap().is_none());

    // the next path query rebuilds once the feature is back
    graphs.find_shortest_path(T, "p0", "p5", None).unwrap();
    assert!(graphs.landmark_summary(T).unwrap().is_some());
}

#[test]
fn landmarks_prune_after_entities_then_edges() {
    let config = GraphConfig {
        landmark_interval: 10,
        ..GraphConfig::default()
    };
    let (graphs, _) = setup(config);
    for side in ["a", "b"] {
        for i in 0..6 {
            person(&graphs, &format!("{}{}", side, i));
        }
    }
    for side in ["a", "b"] {
        for i in 0..5 {
            link(&graphs, &format!("{}{}", side, i), &format!("{}{}", side, i + 1), 0.8);
        }
    }
    // built at the 10th entity, invalidated by the edges since
    assert!(graphs.landmark_summary(T).unwrap().is_none());

    // a cancelled token fails any exact search, so a result means the
    // landmark bound answered first
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let outcome = graphs
        .find_shortest_path_with(T, "a0", "b5", None, &cancelled)
        .unwrap();
    assert_eq!(outcome.reason(), Some(NotFoundReason::NoConnectivity));

    let summary = graphs.landmark_summary(T).unwrap().expect("rebuilt before query");
    assert_eq!(summary.landmarks.len(), 2);

    let paths = graphs
        .find_k_shortest_paths_with(T, "b5", "a0", 2, None, &cancelled)
        .unwrap();
    assert!(matches!(
        paths,
        PathsOutcome::NotFound {
            reason: NotFoundReason::NoConnectivity
        }
    ));
}

#[test]
fn small_tenants_skip_landmark_rebuilds() {
    let (graphs, _) = setup(GraphConfig::default());
    chain(&graphs, 4);
    graphs.find_shortest_path(T, "n0", "n4", None).unwrap();
    assert!(graphs.landmark_summary(T).unwrap().is_none());
}

#[test]
fn landmark_bound_rejects_long_queries() {
    let (graphs, _) = setup(GraphConfig::default());
    chain(&graphs, 9);
    let summary = graphs.recompute_landmarks(T).unwrap().unwrap();
    assert_eq!(summary.landmarks.len(), 2);

    let outcome = graphs.find_shortest_path(T, "n0", "n9", Some(3)).unwrap();
    assert_eq!(outcome.reason(), Some(NotFoundReason::ExceededMaxDegree));
    let outcome = graphs.find_shortest_path(T, "n0", "n3", Some(3)).unwrap();
    assert_eq!(outcome.path().unwrap().len(), 3);

    let est = graphs.landmark_estimate(T, "n0", "n9").unwrap().unwrap();
    assert!(est >= 9);
}

#[test]
fn reclaim_drops_landmarks() {
    let (graphs, _) = setup(GraphConfig::default());
    chain(&graphs, 4);
    graphs.recompute_landmarks(T).unwrap();
    assert!(graphs.landmark_summary(T).unwrap().is_some());

    let report = graphs.reclaim().unwrap();
    assert_eq!(report.tenants, 1);
    assert_eq!(report.landmark_tables_dropped, 1);
    assert!(graphs.landmark_summary(T).unwrap().is_none());
    // graph content survives
    assert!(graphs.find_shortest_path(T, "n0", "n4", None).unwrap().path().is_some());
}

#[test]
fn concurrent_readers_and_writer() {
    let (graphs, _) = setup(GraphConfig::default());
    chain(&graphs, 6);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    let outcome = graphs.find_shortest_path(T, "n0", "n6", None).unwrap();
                    assert!(outcome.path().unwrap().len() <= 7);
                }
            });
        }
        s.spawn(|| {
            for i in 0..50 {
                let id = format!("extra{}", i);
                person(&graphs, &id);
                link(&graphs, "n3", &id, 0.4);
            }
        });
    });

    assert_eq!(graphs.entity_ids(T).unwrap().len(), 57);
}
