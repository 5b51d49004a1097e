//! Composition root: owns the queue, worker pool, sampler, registry and
//! tenant graphs, and exposes the submission, query and observability API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use pathweave_compute::{
    generate_grant_timeline, EngagementSignals, GrantTimeline, MetricsOutcome, NetworkStatistics,
    PathOutcome, PathQuality, PathResult, PathsOutcome, ProjectKind, TenantGraphs,
};
use pathweave_core::{
    Config, Entity, Feature, FeatureStatus, PathweaveError, PressureLevel, RelationshipKind,
    TaskId,
};
use pathweave_graph::EdgeId;
use pathweave_resource::{
    ComplianceLedger, ComplianceReport, FeatureFlagRegistry, FeatureState, LevelTransition,
    ResourceProbe, ResourceSampler, ResourceSnapshot, SystemProbe,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::handler::{GraphTaskHandler, TaskHandler};
use crate::metrics::SchedulerMetrics;
use crate::pool::{spawn_workers, WorkerContext};
use crate::pressure::PressureMonitor;
use crate::queue::WorkflowQueue;
use crate::task::{CancelReason, Priority, TaskPayload, TaskRecord, WorkflowTask};

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub queue_depth: usize,
    pub running_count: usize,
    /// Task records held, finished ones included.
    pub retained_records: usize,
    pub level: PressureLevel,
    pub feature_states: Vec<FeatureState>,
    pub resource_snapshot: Option<ResourceSnapshot>,
    pub metrics: SchedulerMetrics,
    pub shutting_down: bool,
}

// ── Builder ─────────────────────────────────────────────────────────

pub struct OrchestratorBuilder {
    config: Config,
    probe: Option<Box<dyn ResourceProbe>>,
    handler: Option<Arc<dyn TaskHandler>>,
}

impl OrchestratorBuilder {
    /// Defaults to the live [`SystemProbe`].
    pub fn probe(mut self, probe: Box<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Defaults to a [`GraphTaskHandler`] over the orchestrator's graphs.
    pub fn handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        self.config.validate()?;
        let config = self.config;

        let registry = Arc::new(FeatureFlagRegistry::new(&config.resource));
        let graphs = Arc::new(TenantGraphs::new(config.graph.clone(), Arc::clone(&registry)));
        let probe = self
            .probe
            .unwrap_or_else(|| Box::new(SystemProbe::new()));
        let sampler = Arc::new(ResourceSampler::new(probe, &config.resource));
        let ledger = Arc::new(ComplianceLedger::new(config.resource.alert_capacity));
        let queue = Arc::new(WorkflowQueue::new(
            config.orchestrator.dependency_retry(),
            config.orchestrator.finished_task_retention,
        ));
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(GraphTaskHandler::new(Arc::clone(&graphs))));
        let shutdown = CancellationToken::new();

        let workers = Arc::new(WorkerContext {
            queue: Arc::clone(&queue),
            registry: Arc::clone(&registry),
            handler,
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            config: config.orchestrator.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: shutdown.clone(),
        });
        let monitor = Arc::new(PressureMonitor {
            sampler,
            registry: Arc::clone(&registry),
            ledger,
            queue: Arc::clone(&queue),
            graphs: Arc::clone(&graphs),
        });

        Ok(Orchestrator {
            config,
            graphs,
            registry,
            queue,
            workers,
            monitor,
            shutdown,
            handles: Mutex::new(Handles::default()),
        })
    }
}

#[derive(Default)]
struct Handles {
    workers: Vec<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
}

// ── Orchestrator ────────────────────────────────────────────────────

pub struct Orchestrator {
    config: Config,
    graphs: Arc<TenantGraphs>,
    registry: Arc<FeatureFlagRegistry>,
    queue: Arc<WorkflowQueue>,
    workers: Arc<WorkerContext>,
    monitor: Arc<PressureMonitor>,
    shutdown: CancellationToken,
    handles: Mutex<Handles>,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            probe: None,
            handler: None,
        }
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the worker pool and the sampler loop. Must run inside a tokio
    /// runtime; calling twice is a no-op.
    pub fn start(&self) {
        self.start_workers();
        self.start_sampler();
    }

    pub fn start_workers(&self) {
        let mut handles = self.handles();
        if handles.workers.is_empty() && !self.shutdown.is_cancelled() {
            handles.workers = spawn_workers(Arc::clone(&self.workers));
        }
    }

    /// Without this, sampling only happens through [`sample_now`](Self::sample_now).
    pub fn start_sampler(&self) {
        let mut handles = self.handles();
        if handles.sampler.is_none() && !self.shutdown.is_cancelled() {
            let monitor = Arc::clone(&self.monitor);
            let shutdown = self.shutdown.clone();
            handles.sampler = Some(tokio::spawn(monitor.run(shutdown)));
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graphs(&self) -> &Arc<TenantGraphs> {
        &self.graphs
    }

    pub fn registry(&self) -> &Arc<FeatureFlagRegistry> {
        &self.registry
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Queue a task. A task whose feature is disabled is recorded as
    /// Cancelled and never queued; its id is still returned.
    pub fn submit(&self, task: WorkflowTask) -> Result<TaskId, OrchestratorError> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        task.validate().map_err(|e| match e {
            PathweaveError::Validation(msg) => OrchestratorError::Validation(msg),
            other => OrchestratorError::Graph(other),
        })?;

        let feature = task.payload.feature();
        if let Err(PathweaveError::FeatureDisabled { feature, level }) = self.registry.check(feature) {
            warn!(task = %task.id, %feature, %level, "task rejected, feature disabled");
            return self
                .queue
                .reject(task, CancelReason::FeatureDisabled { feature, level });
        }

        let id = task.id;
        let (kind, priority, tenant) = (task.payload.kind(), task.priority, task.tenant.clone());
        self.queue.push(task)?;
        info!(task = %id, kind, ?priority, tenant = %tenant, "task submitted");
        Ok(id)
    }

    pub fn submit_task(
        &self,
        tenant: &str,
        payload: TaskPayload,
        priority: Priority,
        dependencies: &[TaskId],
    ) -> Result<TaskId, OrchestratorError> {
        self.submit(
            WorkflowTask::new(tenant, payload, priority).with_dependencies(dependencies.iter().copied()),
        )
    }

    pub fn get_task_status(&self, id: TaskId) -> Result<TaskRecord, OrchestratorError> {
        self.queue.status(id).ok_or(OrchestratorError::UnknownTask(id))
    }

    pub fn cancel_task(&self, id: TaskId) -> Result<bool, OrchestratorError> {
        let cancelled = self.queue.cancel(id)?;
        if cancelled {
            info!(task = %id, "task cancellation requested");
        }
        Ok(cancelled)
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let mut metrics = self
            .workers
            .metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();
        metrics.tasks_pending = self.queue.pending_by_priority();
        metrics.worker_utilization = self.workers.active.load(Ordering::Relaxed) as f64
            / self.config.orchestrator.worker_count.max(1) as f64;
        metrics.current_level = self.registry.level();

        SystemStatus {
            queue_depth: self.queue.depth(),
            running_count: self.queue.running_count(),
            retained_records: self.queue.record_count(),
            level: self.registry.level(),
            feature_states: self.registry.feature_states(),
            resource_snapshot: self.monitor.sampler.latest(),
            metrics,
            shutting_down: self.shutdown.is_cancelled(),
        }
    }

    // ── Graph mutation and queries ──────────────────────────────────

    pub fn add_entity(&self, tenant: &str, entity: &Entity) -> Result<bool, PathweaveError> {
        self.graphs.add_entity(tenant, entity)
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
        self.graphs
            .add_relationship(tenant, source, target, kind, strength, metadata)
    }

    pub fn find_shortest_path(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        max_degree: Option<usize>,
    ) -> Result<PathOutcome, PathweaveError> {
        self.graphs.find_shortest_path(tenant, source, target, max_degree)
    }

    pub fn find_k_shortest_paths(
        &self,
        tenant: &str,
        source: &str,
        target: &str,
        k: usize,
        max_degree: Option<usize>,
    ) -> Result<PathsOutcome, PathweaveError> {
        self.graphs
            .find_k_shortest_paths(tenant, source, target, k, max_degree)
    }

    pub fn analyze_path_quality(&self, path: &PathResult) -> PathQuality {
        self.graphs.analyze_path_quality(path)
    }

    pub fn compute_sponsor_metrics(
        &self,
        tenant: &str,
        entity: &str,
        signals: Option<&EngagementSignals>,
    ) -> Result<MetricsOutcome, PathweaveError> {
        self.graphs.compute_sponsor_metrics(tenant, entity, signals)
    }

    pub fn generate_grant_timeline(
        &self,
        deadline: DateTime<Utc>,
        kind: ProjectKind,
    ) -> Result<GrantTimeline, PathweaveError> {
        self.registry.check(Feature::TimelinePlanning)?;
        generate_grant_timeline(deadline, kind)
    }

    pub fn network_statistics(&self, tenant: &str) -> Result<NetworkStatistics, PathweaveError> {
        self.graphs.network_statistics(tenant)
    }

    // ── Observability ───────────────────────────────────────────────

    pub fn get_feature_states(&self) -> Vec<FeatureState> {
        self.registry.feature_states()
    }

    pub fn get_resource_snapshot(&self) -> Option<ResourceSnapshot> {
        self.monitor.sampler.latest()
    }

    pub fn get_compliance_report(&self) -> ComplianceReport {
        self.monitor.ledger.report(self.registry.level())
    }

    pub fn force_override(&self, feature: Feature, state: FeatureStatus) {
        self.registry.force_override(feature, state);
    }

    pub fn clear_override(&self, feature: Feature) {
        self.registry.clear_override(feature);
    }

    /// Run one sampler tick synchronously, including enforcement.
    pub fn sample_now(&self) -> Result<LevelTransition, OrchestratorError> {
        Ok(self.monitor.tick()?)
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Stop accepting work, cancel everything outstanding, stop the
    /// sampler and wait for the workers to exit.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("orchestrator shutdown requested");
        self.queue.close();
        let (pending, running) = self.queue.cancel_all(CancelReason::Shutdown);
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.handles());
        for handle in handles.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker exited abnormally");
            }
        }
        if let Some(sampler) = handles.sampler {
            if let Err(e) = sampler.await {
                warn!(error = %e, "sampler exited abnormally");
            }
        }
        info!(pending, running, "orchestrator stopped");
    }
}
