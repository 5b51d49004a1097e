//! Task execution seam.

use std::sync::Arc;

use async_trait::async_trait;
use pathweave_compute::{generate_grant_timeline, MetricsOutcome, TenantGraphs};
use pathweave_core::PathweaveError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TaskError;
use crate::task::{TaskPayload, WorkflowTask};

/// Executes one attempt of a task.
///
/// Implementations should observe `cancel` and return
/// `PathweaveError::Cancelled` once it fires.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &WorkflowTask, cancel: CancellationToken) -> Result<Value, TaskError>;
}

/// Runs graph, metrics and timeline payloads against [`TenantGraphs`] on the
/// blocking pool.
pub struct GraphTaskHandler {
    graphs: Arc<TenantGraphs>,
}

impl GraphTaskHandler {
    pub fn new(graphs: Arc<TenantGraphs>) -> Self {
        Self { graphs }
    }
}

#[async_trait]
impl TaskHandler for GraphTaskHandler {
    async fn handle(&self, task: &WorkflowTask, cancel: CancellationToken) -> Result<Value, TaskError> {
        let graphs = Arc::clone(&self.graphs);
        let tenant = task.tenant.clone();
        let payload = task.payload.clone();
        tokio::task::spawn_blocking(move || execute(&graphs, &tenant, &payload, &cancel))
            .await
            .map_err(|e| TaskError::Panicked(e.to_string()))?
    }
}

fn execute(
    graphs: &TenantGraphs,
    tenant: &str,
    payload: &TaskPayload,
    cancel: &CancellationToken,
) -> Result<Value, TaskError> {
    if cancel.is_cancelled() {
        return Err(PathweaveError::Cancelled.into());
    }
    debug!(tenant, kind = payload.kind(), "executing task payload");

    let value = match payload {
        TaskPayload::PathDiscovery {
            source,
            target,
            max_degree,
            k: None,
        } => serde_json::to_value(
            graphs.find_shortest_path_with(tenant, source, target, *max_degree, cancel)?,
        )?,
        TaskPayload::PathDiscovery {
            source,
            target,
            max_degree,
            k: Some(k),
        } => serde_json::to_value(
            graphs.find_k_shortest_paths_with(tenant, source, target, *k, *max_degree, cancel)?,
        )?,
        TaskPayload::Metrics { entity, signals } => {
            match graphs.compute_sponsor_metrics(tenant, entity, signals.as_ref())? {
                MetricsOutcome::Disabled { feature, level } => {
                    return Err(PathweaveError::FeatureDisabled { feature, level }.into());
                }
                outcome => serde_json::to_value(outcome)?,
            }
        }
        TaskPayload::Timeline {
            deadline,
            project_kind,
        } => serde_json::to_value(generate_grant_timeline(*deadline, *project_kind)?)?,
        TaskPayload::LandmarkRefresh => match graphs.recompute_landmarks(tenant)? {
            Some(summary) => serde_json::to_value(summary)?,
            None if graphs.entity_ids(tenant)?.is_empty() => Value::Null,
            // graph moved on while tables were built
            None => {
                return Err(PathweaveError::TransientExecution(
                    "landmark tables went stale during recomputation".into(),
                )
                .into())
            }
        },
    };
    Ok(value)
}
