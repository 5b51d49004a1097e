//! Sponsor influence scoring.
//!
//! Scores are recomputed on every call from the live graph and the caller's
//! engagement signals; nothing is cached.

use chrono::{DateTime, Utc};
use pathweave_core::{EntityId, Feature, PathweaveError, PressureLevel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithms::degree::node_degree_centrality;
use crate::tenant::TenantGraphs;

/// Interactions per quarter at which the frequency score saturates.
const FREQUENCY_SATURATION: f64 = 12.0;
/// Response latency (days) at which the latency score halves.
const LATENCY_HALF_LIFE_DAYS: f64 = 7.0;
const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    #[default]
    Unrated,
}

impl SponsorTier {
    pub fn multiplier(self) -> f64 {
        match self {
            SponsorTier::Platinum => 1.0,
            SponsorTier::Gold => 0.85,
            SponsorTier::Silver => 0.7,
            SponsorTier::Bronze => 0.55,
            SponsorTier::Unrated => 0.5,
        }
    }

    /// Case-insensitive; anything unrecognized is `Unrated`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "platinum" => SponsorTier::Platinum,
            "gold" => SponsorTier::Gold,
            "silver" => SponsorTier::Silver,
            "bronze" => SponsorTier::Bronze,
            _ => SponsorTier::Unrated,
        }
    }
}

/// Caller-supplied engagement history. Absent fields take neutral defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSignals {
    /// Interactions per quarter.
    #[serde(default)]
    pub interaction_frequency: Option<f64>,
    #[serde(default)]
    pub response_latency_days: Option<f64>,
    /// Share of past commitments fulfilled, in [0, 1].
    #[serde(default)]
    pub fulfillment_ratio: Option<f64>,
    #[serde(default)]
    pub tier: Option<SponsorTier>,
}

impl EngagementSignals {
    pub fn validate(&self) -> Result<(), PathweaveError> {
        let non_negative = [
            ("interaction_frequency", self.interaction_frequency),
            ("response_latency_days", self.response_latency_days),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(PathweaveError::validation(format!(
                        "{} must be a non-negative number, got {}",
                        name, v
                    )));
                }
            }
        }
        if let Some(r) = self.fulfillment_ratio {
            if !(0.0..=1.0).contains(&r) {
                return Err(PathweaveError::validation(format!(
                    "fulfillment_ratio must be within [0, 1], got {}",
                    r
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorMetrics {
    pub entity: EntityId,
    pub degree_centrality: f64,
    pub mean_incident_strength: f64,
    /// `0.6 * degree + 0.4 * mean incident strength`.
    pub relationship_centrality: f64,
    pub response_likelihood: f64,
    pub funding_probability: f64,
    pub tier: SponsorTier,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricsOutcome {
    Computed { metrics: SponsorMetrics },
    Disabled { feature: Feature, level: PressureLevel },
    UnknownEntity,
}

/// Graph-derived inputs to the scoring formula.
#[derive(Debug, Clone, Copy)]
pub struct GraphSignals {
    pub degree_centrality: f64,
    pub mean_incident_strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub relationship_centrality: f64,
    pub response_likelihood: f64,
    pub funding_probability: f64,
}

/// Deterministic scoring; every output is clamped to [0, 1].
pub fn score(graph: GraphSignals, signals: &EngagementSignals, tier: SponsorTier) -> Scores {
    let centrality =
        (0.6 * graph.degree_centrality + 0.4 * graph.mean_incident_strength).clamp(0.0, 1.0);

    let frequency = signals
        .interaction_frequency
        .map(|f| (f / FREQUENCY_SATURATION).min(1.0))
        .unwrap_or(NEUTRAL);
    let latency = signals
        .response_latency_days
        .map(|d| 1.0 / (1.0 + d / LATENCY_HALF_LIFE_DAYS))
        .unwrap_or(NEUTRAL);
    let fulfillment = signals.fulfillment_ratio.unwrap_or(NEUTRAL);

    let response = (0.5 * latency + 0.3 * frequency + 0.2 * centrality).clamp(0.0, 1.0);
    let funding =
        ((0.4 * fulfillment + 0.3 * centrality + 0.3 * response) * tier.multiplier()).clamp(0.0, 1.0);

    Scores {
        relationship_centrality: centrality,
        response_likelihood: response,
        funding_probability: funding,
    }
}

impl TenantGraphs {
    /// Influence scores for one entity. Fails closed when advanced
    /// analytics are disabled.
    pub fn compute_sponsor_metrics(
        &self,
        tenant: &str,
        entity: &str,
        signals: Option<&EngagementSignals>,
    ) -> Result<MetricsOutcome, PathweaveError> {
        let default_signals = EngagementSignals::default();
        let signals = signals.unwrap_or(&default_signals);
        signals.validate()?;

        if !self.registry().is_feature_enabled(Feature::AdvancedAnalytics) {
            return Ok(MetricsOutcome::Disabled {
                feature: Feature::AdvancedAnalytics,
                level: self.registry().level(),
            });
        }

        let inputs = self.with_graph(tenant, |g| {
            let store = &g.store;
            let node = store.get(entity)?;

            let strengths: Vec<f64> = store
                .out_edges(entity)
                .chain(store.in_edges(entity))
                .map(|e| e.strength)
                .collect();
            let mean_incident_strength = if strengths.is_empty() {
                0.0
            } else {
                strengths.iter().sum::<f64>() / strengths.len() as f64
            };

            let attribute_tier = node
                .attributes
                .get("tier")
                .and_then(|v| v.as_str())
                .map(SponsorTier::parse);

            Some((
                GraphSignals {
                    degree_centrality: node_degree_centrality(store, entity),
                    mean_incident_strength,
                },
                attribute_tier,
            ))
        })?;

        let Some((graph_signals, attribute_tier)) = inputs.flatten() else {
            return Ok(MetricsOutcome::UnknownEntity);
        };

        let tier = signals.tier.or(attribute_tier).unwrap_or_default();
        let scores = score(graph_signals, signals, tier);
        debug!(
            tenant,
            entity,
            funding = scores.funding_probability,
            response = scores.response_likelihood,
            "sponsor metrics computed"
        );

        Ok(MetricsOutcome::Computed {
            metrics: SponsorMetrics {
                entity: entity.to_string(),
                degree_centrality: graph_signals.degree_centrality,
                mean_incident_strength: graph_signals.mean_incident_strength,
                relationship_centrality: scores.relationship_centrality,
                response_likelihood: scores.response_likelihood,
                funding_probability: scores.funding_probability,
                tier,
                computed_at: Utc::now(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pathweave_core::config::{GraphConfig, ResourceConfig};
    use pathweave_core::{Entity, EntityKind, RelationshipKind};
    use pathweave_resource::{FeatureFlagRegistry, ResourceReading, SnapshotHistory};
    use serde_json::json;

    const T: &str = "t";

    fn sponsor_graph() -> (TenantGraphs, Arc<FeatureFlagRegistry>) {
        let registry = Arc::new(FeatureFlagRegistry::new(&ResourceConfig::default()));
        let graphs = TenantGraphs::new(GraphConfig::default(), Arc::clone(&registry));
        graphs
            .add_entity(T, &Entity::new("acme", EntityKind::Sponsor).with_attribute("tier", json!("Gold")))
            .unwrap();
        for p in ["alice", "bob", "carol"] {
            graphs.add_entity(T, &Entity::new(p, EntityKind::Person)).unwrap();
        }
        graphs
            .add_relationship(T, "alice", "acme", RelationshipKind::Funding, 0.9, None)
            .unwrap();
        graphs
            .add_relationship(T, "bob", "acme", RelationshipKind::Advisory, 0.5, None)
            .unwrap();
        (graphs, registry)
    }

    fn computed(outcome: MetricsOutcome) -> SponsorMetrics {
        match outcome {
            MetricsOutcome::Computed { metrics } => metrics,
            other => panic!("expected metrics, got {:?}", other),
        }
    }

    #[test]
    fn scores_are_bounded() {
        let extremes = [
            EngagementSignals {
                interaction_frequency: Some(1000.0),
                response_latency_days: Some(0.0),
                fulfillment_ratio: Some(1.0),
                tier: Some(SponsorTier::Platinum),
            },
            EngagementSignals {
                interaction_frequency: Some(0.0),
                response_latency_days: Some(10_000.0),
                fulfillment_ratio: Some(0.0),
                tier: None,
            },
        ];
        for signals in &extremes {
            for g in [(0.0, 0.0), (1.0, 1.0)] {
                let s = score(
                    GraphSignals {
                        degree_centrality: g.0,
                        mean_incident_strength: g.1,
                    },
                    signals,
                    signals.tier.unwrap_or_default(),
                );
                for v in [s.relationship_centrality, s.response_likelihood, s.funding_probability] {
                    assert!((0.0..=1.0).contains(&v), "score {} out of range", v);
                }
            }
        }
    }

    #[test]
    fn graph_position_feeds_centrality() {
        let (graphs, _) = sponsor_graph();
        let m = computed(graphs.compute_sponsor_metrics(T, "acme", None).unwrap());

        // acme touches 2 of 3 other nodes; incident strengths 0.9, 0.72, 0.5, 0.4
        assert!((m.degree_centrality - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.mean_incident_strength - 0.63).abs() < 1e-9);
        assert!((m.relationship_centrality - (0.4 + 0.252)).abs() < 1e-9);
        assert_eq!(m.tier, SponsorTier::Gold);
    }

    #[test]
    fn signal_tier_overrides_attribute() {
        let (graphs, _) = sponsor_graph();
        let signals = EngagementSignals {
            tier: Some(SponsorTier::Bronze),
            ..Default::default()
        };
        let m = computed(graphs.compute_sponsor_metrics(T, "acme", Some(&signals)).unwrap());
        assert_eq!(m.tier, SponsorTier::Bronze);
    }

    #[test]
    fn better_engagement_raises_scores() {
        let (graphs, _) = sponsor_graph();
        let cold = EngagementSignals {
            interaction_frequency: Some(1.0),
            response_latency_days: Some(30.0),
            fulfillment_ratio: Some(0.2),
            tier: None,
        };
        let warm = EngagementSignals {
            interaction_frequency: Some(10.0),
            response_latency_days: Some(1.0),
            fulfillment_ratio: Some(0.9),
            tier: None,
        };
        let cold = computed(graphs.compute_sponsor_metrics(T, "acme", Some(&cold)).unwrap());
        let warm = computed(graphs.compute_sponsor_metrics(T, "acme", Some(&warm)).unwrap());
        assert!(warm.response_likelihood > cold.response_likelihood);
        assert!(warm.funding_probability > cold.funding_probability);
    }

    #[test]
    fn invalid_signals_are_rejected() {
        let (graphs, _) = sponsor_graph();
        for signals in [
            EngagementSignals {
                interaction_frequency: Some(-1.0),
                ..Default::default()
            },
            EngagementSignals {
                fulfillment_ratio: Some(1.2),
                ..Default::default()
            },
            EngagementSignals {
                response_latency_days: Some(f64::NAN),
                ..Default::default()
            },
        ] {
            let err = graphs.compute_sponsor_metrics(T, "acme", Some(&signals)).unwrap_err();
            assert!(matches!(err, PathweaveError::Validation(_)));
        }
    }

    #[test]
    fn unknown_entity_is_reported() {
        let (graphs, _) = sponsor_graph();
        assert_eq!(
            graphs.compute_sponsor_metrics(T, "ghost", None).unwrap(),
            MetricsOutcome::UnknownEntity
        );
        assert_eq!(
            graphs.compute_sponsor_metrics("other", "acme", None).unwrap(),
            MetricsOutcome::UnknownEntity
        );
    }

    #[test]
    fn fails_closed_under_pressure() {
        let (graphs, registry) = sponsor_graph();
        let mut h = SnapshotHistory::new(1);
        registry.observe(&h.push(ResourceReading::memory(93.0), Utc::now()));

        let outcome = graphs.compute_sponsor_metrics(T, "acme", None).unwrap();
        assert_eq!(
            outcome,
            MetricsOutcome::Disabled {
                feature: Feature::AdvancedAnalytics,
                level: PressureLevel::Critical,
            }
        );
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "disabled");
    }

    #[test]
    fn tier_parsing_is_lenient() {
        assert_eq!(SponsorTier::parse(" PLATINUM "), SponsorTier::Platinum);
        assert_eq!(SponsorTier::parse("diamond"), SponsorTier::Unrated);
        assert!(SponsorTier::Gold.multiplier() > SponsorTier::Silver.multiplier());
    }
}
