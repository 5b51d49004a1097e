//! Multi-tenant relationship graph facade.
//!
//! Each tenant owns an independent [`TenantGraph`] behind its own
//! `RwLock`: many concurrent readers or a single writer, and no lock is
//! shared between tenants. Every query consults the
//! [`FeatureFlagRegistry`] before doing expensive work.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pathweave_core::config::GraphConfig;
use pathweave_core::{
    Entity, EntityId, Feature, FeatureStatus, PathweaveError, RelationshipKind, TenantId,
};
use pathweave_graph::{Edge, EdgeId, GraphStore, Node, UpsertOutcome};
use pathweave_resource::FeatureFlagRegistry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::algorithms::graph_stats::{network_statistics, NetworkStatistics};
use crate::algorithms::k_shortest::k_shortest_paths;
use crate::algorithms::landmarks::{landmark_count, HopBound, LandmarkIndex, LandmarkSummary};
use crate::algorithms::path::{NotFoundReason, PathOutcome, PathResult, PathsOutcome};
use crate::algorithms::quality::{analyze_path_quality, PathQuality};
use crate::algorithms::shortest_path::{not_found_reason, shortest_path};

#[cfg(test)]
mod tests;

/// One tenant's graph plus its derived landmark tables.
pub struct TenantGraph {
    pub store: GraphStore,
    landmarks: Option<Arc<LandmarkIndex>>,
    /// Node count at which landmarks are next recomputed.
    landmark_watermark: usize,
}

impl TenantGraph {
    fn new(interval: usize) -> Self {
        Self {
            store: GraphStore::new(),
            landmarks: None,
            landmark_watermark: interval,
        }
    }

    /// Landmark tables, if they describe the current topology.
    fn fresh_landmarks(&self) -> Option<&LandmarkIndex> {
        self.landmarks
            .as_deref()
            .filter(|idx| idx.is_fresh(self.store.revision()))
    }

    /// Cheap rejection before exact search.
    fn landmark_prune(&self, from: &str, to: &str, max_degree: usize) -> Option<NotFoundReason> {
        match self.fresh_landmarks()?.lower_bound(from, to)? {
            HopBound::Disconnected => Some(NotFoundReason::NoConnectivity),
            HopBound::AtLeast(bound) if bound > max_degree => Some(NotFoundReason::ExceededMaxDegree),
            HopBound::AtLeast(_) => None,
        }
    }

    fn advance_watermark(&mut self, interval: usize) {
        let nodes = self.store.node_count();
        let interval = interval.max(1);
        self.landmark_watermark = (nodes / interval + 1) * interval;
    }
}

/// Result of an Emergency reclamation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclaimReport {
    pub tenants: usize,
    pub landmark_tables_dropped: usize,
}

pub struct TenantGraphs {
    tenants: RwLock<HashMap<TenantId, Arc<RwLock<TenantGraph>>>>,
    config: GraphConfig,
    registry: Arc<FeatureFlagRegistry>,
}

fn poisoned(what: &str, e: impl std::fmt::Display) -> PathweaveError {
    PathweaveError::LockPoisoned(format!("{}: {}", what, e))
}

impl TenantGraphs {
    pub fn new(config: GraphConfig, registry: Arc<FeatureFlagRegistry>) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FeatureFlagRegistry> {
        &self.registry
    }

    fn tenant(&self, tenant: &str) -> Result<Option<Arc<RwLock<TenantGraph>>>, PathweaveError> {
        let map = self.tenants.read().map_err(|e| poisoned("tenant map", e))?;
        Ok(map.get(tenant).cloned())
    }

    fn tenant_or_create(&self, tenant: &str) -> Result<Arc<RwLock<TenantGraph>>, PathweaveError> {
        if let Some(graph) = self.tenant(tenant)? {
            return Ok(graph);
        }
        let mut map = self.tenants.write().map_err(|e| poisoned("tenant map", e))?;
        let graph = map
            .entry(tenant.to_string())
            .or_insert_with(|| {
                debug!(tenant, "creating tenant graph");
                Arc::new(RwLock::new(TenantGraph::new(self.config.landmark_interval)))
            })
            .clone();
        Ok(graph)
    }

    /// Run `f` under the tenant's read lock. `None` for an unknown tenant.
    pub(crate) fn with_graph<R>(
        &self,
        tenant: &str,
        f: impl FnOnce(&TenantGraph) -> R,
    ) -> Result<Option<R>, PathweaveError> {
        let Some(graph) = self.tenant(tenant)? else {
            return Ok(None);
        };
        let guard = graph.read().map_err(|e| poisoned(tenant, e))?;
        Ok(Some(f(&guard)))
    }

    pub fn tenant_ids(&self) -> Result<Vec<TenantId>, PathweaveError> {
        let map = self.tenants.read().map_err(|e| poisoned("tenant map", e))?;
        let mut ids: Vec<TenantId> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Idempotent upsert. Returns `true` when a new node was inserted.
    pub fn add_entity(&self, tenant: &str, entity: &Entity) -> Result<bool, PathweaveError> {
        if tenant.is_empty() {
            return Err(PathweaveError::validation("tenant id must not be empty"));
        }
        if entity.id.is_empty() {
            return Err(PathweaveError::validation("entity id must not be empty"));
        }

        let graph = self.tenant_or_create(tenant)?;
        let (outcome, due) = {
            let mut g = graph.write().map_err(|e| poisoned(tenant, e))?;
            let outcome = g.store.upsert_entity(entity);
            let due = outcome == UpsertOutcome::Inserted
                && g.store.node_count() >= g.landmark_watermark;
            (outcome, due)
        };

        if due {
            self.refresh_landmarks_on_growth(tenant);
        }
        Ok(outcome == UpsertOutcome::Inserted)
    }

    pub fn add_relationship(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        strength: f64,
        metadata: Option<serde_json::Value>,
    ) -> Result<EdgeId, PathweaveError> {
        let Some(graph) = self.tenant(tenant)? else {
            return Err(PathweaveError::validation(format!(
                "unknown entity '{}' in tenant '{}'",
                source, tenant
            )));
        };
        let mut g = graph.write().map_err(|e| poisoned(tenant, e))?;
        g.store.add_relationship(
            source,
            target,
            kind,
            strength,
            self.config.asymmetry_factor,
            metadata,
        )
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub fn get_entity(&self, tenant: &str, id: &str) -> Result<Option<Node>, PathweaveError> {
        Ok(self
            .with_graph(tenant, |g| g.store.get(id).cloned())?
            .flatten())
    }

    /// Outgoing edges of `id`, inferred reverses included.
    pub fn neighbors(&self, tenant: &str, id: &str) -> Result<Vec<Edge>, PathweaveError> {
        Ok(self
            .with_graph(tenant, |g| g.store.out_edges(id).cloned().collect())?
            .unwrap_or_default())
    }

    // ── Path discovery ──────────────────────────────────────────────

    /// Hop limit after applying the PathDiscovery feature state.
    fn effective_max_degree(&self, requested: Option<usize>) -> Result<usize, PathweaveError> {
        let requested = requested.unwrap_or(self.config.max_path_degree);
        match self.registry.check(Feature::PathDiscovery)? {
            FeatureStatus::Degraded => Ok(requested.min(self.config.degraded_max_degree)),
            _ => Ok(requested),
        }
    }

    pub fn find_shortest_path(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        max_degree: Option<usize>,
    ) -> Result<PathOutcome, PathweaveError> {
        self.find_shortest_path_with(tenant, source, target, max_degree, &CancellationToken::new())
    }

    /// Like [`find_shortest_path`](Self::find_shortest_path), observing `cancel`.
    pub fn find_shortest_path_with(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        max_degree: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<PathOutcome, PathweaveError> {
        let max_degree = self.effective_max_degree(max_degree)?;
        let decay = self.config.confidence_decay;
        self.refresh_stale_landmarks(tenant);

        let outcome = self.with_graph(tenant, |g| {
            if source != target && g.store.contains(source) && g.store.contains(target) {
                if let Some(reason) = g.landmark_prune(source, target, max_degree) {
                    debug!(tenant, source, target, %reason, "landmark bound skipped search");
                    return Ok(PathOutcome::NotFound { reason });
                }
            }
            shortest_path(&g.store, source, target, max_degree, decay, cancel)
        })?;

        let outcome = outcome.unwrap_or(Ok(PathOutcome::NotFound {
            reason: NotFoundReason::UnknownEntity,
        }))?;
        debug!(
            tenant,
            source,
            target,
            max_degree,
            found = outcome.path().is_some(),
            "shortest path query"
        );
        Ok(outcome)
    }

    pub fn find_k_shortest_paths(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        k: usize,
        max_degree: Option<usize>,
    ) -> Result<PathsOutcome, PathweaveError> {
        self.find_k_shortest_paths_with(tenant, source, target, k, max_degree, &CancellationToken::new())
    }

    pub fn find_k_shortest_paths_with(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        k: usize,
        max_degree: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<PathsOutcome, PathweaveError> {
        if k == 0 {
            return Err(PathweaveError::validation("k must be at least 1"));
        }
        let k = match self.registry.check(Feature::AdvancedAnalytics)? {
            FeatureStatus::Degraded => k.min(self.config.degraded_k_cap),
            _ => k,
        };
        let max_degree = self.effective_max_degree(max_degree)?;
        let decay = self.config.confidence_decay;
        self.refresh_stale_landmarks(tenant);

        let outcome = self.with_graph(tenant, |g| {
            let store = &g.store;
            if !store.contains(source) || !store.contains(target) {
                return Ok(PathsOutcome::NotFound {
                    reason: NotFoundReason::UnknownEntity,
                });
            }
            if source == target {
                return Ok(PathsOutcome::Found {
                    paths: vec![PathResult::trivial(source)],
                });
            }
            if let Some(reason) = g.landmark_prune(source, target, max_degree) {
                return Ok(PathsOutcome::NotFound { reason });
            }
            let paths = k_shortest_paths(store, source, target, k, max_degree, decay, cancel)?;
            if paths.is_empty() {
                Ok(PathsOutcome::NotFound {
                    reason: not_found_reason(store, source, target),
                })
            } else {
                Ok(PathsOutcome::Found { paths })
            }
        })?;

        outcome.unwrap_or(Ok(PathsOutcome::NotFound {
            reason: NotFoundReason::UnknownEntity,
        }))
    }

    pub fn analyze_path_quality(&self, path: &PathResult) -> PathQuality {
        analyze_path_quality(path)
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub fn network_statistics(&self, tenant: &str) -> Result<NetworkStatistics, PathweaveError> {
        let status = self.registry.check(Feature::AdvancedAnalytics)?;
        let with_clustering = status == FeatureStatus::Enabled;
        Ok(self
            .with_graph(tenant, |g| network_statistics(&g.store, with_clustering))?
            .unwrap_or_default())
    }

    // ── Landmarks ───────────────────────────────────────────────────

    fn refresh_landmarks_on_growth(&self, tenant: &str) {
        if !self.registry.is_feature_enabled(Feature::LandmarkMaintenance) {
            info!(tenant, level = %self.registry.level(), "landmark recomputation deferred");
            // path queries rebuild once the feature is back
            if let Ok(Some(graph)) = self.tenant(tenant) {
                if let Ok(mut g) = graph.write() {
                    g.advance_watermark(self.config.landmark_interval);
                }
            }
            return;
        }
        if let Err(e) = self.recompute_landmarks(tenant) {
            warn!(tenant, error = %e, "landmark recomputation failed");
        }
    }

    /// Rebuild landmark tables invalidated by later mutations before a path
    /// query, for tenants large enough to carry landmarks at all.
    fn refresh_stale_landmarks(&self, tenant: &str) {
        let interval = self.config.landmark_interval.max(1);
        let stale = matches!(
            self.with_graph(tenant, |g| {
                g.store.node_count() >= interval && g.fresh_landmarks().is_none()
            }),
            Ok(Some(true))
        );
        if !stale || !self.registry.is_feature_enabled(Feature::LandmarkMaintenance) {
            return;
        }
        match self.recompute_landmarks(tenant) {
            Ok(Some(_)) => debug!(tenant, "stale landmarks rebuilt before query"),
            Ok(None) => {}
            Err(e) => warn!(tenant, error = %e, "landmark rebuild failed"),
        }
    }

    /// Reselect landmarks and rebuild their tables.
    ///
    /// Tables are computed under the read lock and installed under a short
    /// write lock; if the graph changed in between the result is discarded
    /// and `Ok(None)` returned.
    pub fn recompute_landmarks(&self, tenant: &str) -> Result<Option<LandmarkSummary>, PathweaveError> {
        let status = self.registry.check(Feature::LandmarkMaintenance)?;
        let Some(graph) = self.tenant(tenant)? else {
            return Ok(None);
        };

        let index = {
            let g = graph.read().map_err(|e| poisoned(tenant, e))?;
            let nodes = g.store.node_count();
            let count = match status {
                FeatureStatus::Degraded => self.config.min_landmarks.min(nodes),
                _ => landmark_count(
                    nodes,
                    self.config.landmark_ratio,
                    self.config.min_landmarks,
                    self.config.max_landmarks,
                ),
            };
            LandmarkIndex::build(&g.store, count)
        };

        let mut g = graph.write().map_err(|e| poisoned(tenant, e))?;
        g.advance_watermark(self.config.landmark_interval);
        if !index.is_fresh(g.store.revision()) {
            debug!(
                tenant,
                computed = index.revision(),
                current = g.store.revision(),
                "discarding stale landmark tables"
            );
            return Ok(None);
        }
        let summary = index.summary();
        g.landmarks = Some(Arc::new(index));
        info!(
            tenant,
            landmarks = summary.landmarks.len(),
            revision = summary.revision,
            "landmarks recomputed"
        );
        Ok(Some(summary))
    }

    /// Current landmarks, if fresh.
    pub fn landmark_summary(&self, tenant: &str) -> Result<Option<LandmarkSummary>, PathweaveError> {
        Ok(self
            .with_graph(tenant, |g| g.fresh_landmarks().map(|idx| idx.summary()))?
            .flatten())
    }

    /// Landmark triangulation estimate of the hop distance. Diagnostic only.
    pub fn landmark_estimate(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<usize>, PathweaveError> {
        Ok(self
            .with_graph(tenant, |g| {
                g.fresh_landmarks().and_then(|idx| idx.estimate(source, target))
            })?
            .flatten())
    }

    // ── Reclamation ─────────────────────────────────────────────────

    /// Drop landmark tables and release spare map capacity in every tenant.
    pub fn reclaim(&self) -> Result<ReclaimReport, PathweaveError> {
        let graphs: Vec<(TenantId, Arc<RwLock<TenantGraph>>)> = {
            let map = self.tenants.read().map_err(|e| poisoned("tenant map", e))?;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut report = ReclaimReport::default();
        for (tenant, graph) in graphs {
            let mut g = graph.write().map_err(|e| poisoned(&tenant, e))?;
            if g.landmarks.take().is_some() {
                report.landmark_tables_dropped += 1;
            }
            g.store.shrink();
            report.tenants += 1;
        }
        warn!(
            tenants = report.tenants,
            dropped = report.landmark_tables_dropped,
            "reclaimed tenant graph memory"
        );
        Ok(report)
    }

    /// Ids of every entity in a tenant; empty for an unknown tenant.
    pub fn entity_ids(&self, tenant: &str) -> Result<Vec<EntityId>, PathweaveError> {
        Ok(self
            .with_graph(tenant, |g| {
                let mut ids: Vec<EntityId> = g.store.nodes.keys().cloned().collect();
                ids.sort();
                ids
            })?
            .unwrap_or_default())
    }
}
