//! Workflow task model: priorities, payloads and the status state machine.

use chrono::{DateTime, Utc};
use pathweave_compute::{EngagementSignals, ProjectKind};
use pathweave_core::{EntityId, Feature, PathweaveError, PressureLevel, TaskId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dequeue priority. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Legal moves. `Running -> Pending` is a retry.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Pending)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelReason {
    FeatureDisabled { feature: Feature, level: PressureLevel },
    Requested,
    DependencyFailed { dependency: TaskId },
    ResourceExhausted { level: PressureLevel },
    Shutdown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::FeatureDisabled { feature, level } => {
                write!(f, "feature {} disabled at {} pressure", feature, level)
            }
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::DependencyFailed { dependency } => {
                write!(f, "dependency {} did not complete", dependency)
            }
            CancelReason::ResourceExhausted { level } => {
                write!(f, "resources exhausted at {} pressure", level)
            }
            CancelReason::Shutdown => write!(f, "orchestrator shutdown"),
        }
    }
}

/// Work to perform. The tag doubles as the task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    PathDiscovery {
        source: EntityId,
        target: EntityId,
        #[serde(default)]
        max_degree: Option<usize>,
        /// Enumerate up to `k` paths instead of the single best one.
        #[serde(default)]
        k: Option<usize>,
    },
    Metrics {
        entity: EntityId,
        #[serde(default)]
        signals: Option<EngagementSignals>,
    },
    Timeline {
        deadline: DateTime<Utc>,
        #[serde(default)]
        project_kind: ProjectKind,
    },
    LandmarkRefresh,
}

impl TaskPayload {
    /// Feature consulted before the task is queued and before each attempt.
    pub fn feature(&self) -> Feature {
        match self {
            TaskPayload::PathDiscovery { k: Some(_), .. } => Feature::AdvancedAnalytics,
            TaskPayload::PathDiscovery { .. } => Feature::PathDiscovery,
            TaskPayload::Metrics { .. } => Feature::AdvancedAnalytics,
            TaskPayload::Timeline { .. } => Feature::TimelinePlanning,
            TaskPayload::LandmarkRefresh => Feature::LandmarkMaintenance,
        }
    }

    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::PathDiscovery { k: Some(_), .. } => "k_shortest_paths",
            TaskPayload::PathDiscovery { .. } => "path_discovery",
            TaskPayload::Metrics { .. } => "sponsor_metrics",
            TaskPayload::Timeline { .. } => "grant_timeline",
            TaskPayload::LandmarkRefresh => "landmark_refresh",
        }
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), PathweaveError> {
        match self {
            TaskPayload::PathDiscovery { source, target, k, .. } => {
                if source.is_empty() || target.is_empty() {
                    return Err(PathweaveError::validation("path endpoints must be non-empty"));
                }
                if *k == Some(0) {
                    return Err(PathweaveError::validation("k must be at least 1"));
                }
                Ok(())
            }
            TaskPayload::Metrics { entity, signals } => {
                if entity.is_empty() {
                    return Err(PathweaveError::validation("entity id must be non-empty"));
                }
                signals.as_ref().map_or(Ok(()), |s| s.validate())
            }
            TaskPayload::Timeline { deadline, .. } if *deadline <= now => Err(
                PathweaveError::validation(format!(
                    "deadline {} is not in the future",
                    deadline.to_rfc3339()
                )),
            ),
            TaskPayload::Timeline { .. } | TaskPayload::LandmarkRefresh => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: TaskId,
    pub tenant: TenantId,
    pub priority: Priority,
    pub payload: TaskPayload,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub submitted_at: DateTime<Utc>,
}

impl WorkflowTask {
    pub fn new(tenant: impl Into<TenantId>, payload: TaskPayload, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            priority,
            payload,
            dependencies: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    pub fn validate(&self) -> Result<(), PathweaveError> {
        if self.tenant.is_empty() {
            return Err(PathweaveError::validation("tenant id must be non-empty"));
        }
        if self.dependencies.contains(&self.id) {
            return Err(PathweaveError::validation(format!(
                "task {} depends on itself",
                self.id
            )));
        }
        self.payload.validate(Utc::now())
    }
}

/// Read-only view of a task returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub tenant: TenantId,
    pub kind: &'static str,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Handler attempts started so far.
    pub attempts: u32,
    pub dependencies: Vec<TaskId>,
    pub result: Option<serde_json::Value>,
    /// Most recent handler error.
    pub error: Option<String>,
    pub cancel_reason: Option<CancelReason>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub(crate) fn pending(task: &WorkflowTask) -> Self {
        Self {
            id: task.id,
            tenant: task.tenant.clone(),
            kind: task.payload.kind(),
            priority: task.priority,
            status: TaskStatus::Pending,
            attempts: 0,
            dependencies: task.dependencies.clone(),
            result: None,
            error: None,
            cancel_reason: None,
            submitted_at: task.submitted_at,
            updated_at: task.submitted_at,
        }
    }

    /// Apply a checked status change.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> Result<(), PathweaveError> {
        if !self.status.can_transition_to(next) {
            return Err(PathweaveError::validation(format!(
                "task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn record_rejects_illegal_transition() {
        let task = WorkflowTask::new("t", TaskPayload::LandmarkRefresh, Priority::Low);
        let mut record = TaskRecord::pending(&task);
        assert!(record.transition(TaskStatus::Completed).is_err());
        record.transition(TaskStatus::Running).unwrap();
        record.transition(TaskStatus::Completed).unwrap();
        assert!(record.transition(TaskStatus::Cancelled).is_err());
    }

    #[test]
    fn payload_features() {
        let path = TaskPayload::PathDiscovery {
            source: "a".into(),
            target: "b".into(),
            max_degree: None,
            k: None,
        };
        assert_eq!(path.feature(), Feature::PathDiscovery);
        let k_paths = TaskPayload::PathDiscovery {
            source: "a".into(),
            target: "b".into(),
            max_degree: None,
            k: Some(3),
        };
        assert_eq!(k_paths.feature(), Feature::AdvancedAnalytics);
        assert_eq!(TaskPayload::LandmarkRefresh.feature(), Feature::LandmarkMaintenance);
    }

    #[test]
    fn self_dependency_is_invalid() {
        let task = WorkflowTask::new("t", TaskPayload::LandmarkRefresh, Priority::Low);
        let id = task.id;
        assert!(task.with_dependencies([id]).validate().is_err());
    }

    #[test]
    fn payload_validation() {
        let now = Utc::now();
        let past = TaskPayload::Timeline {
            deadline: now - Duration::days(1),
            project_kind: ProjectKind::Foundation,
        };
        assert!(past.validate(now).is_err());

        let bad_signals = TaskPayload::Metrics {
            entity: "acme".into(),
            signals: Some(EngagementSignals {
                fulfillment_ratio: Some(1.5),
                ..Default::default()
            }),
        };
        assert!(bad_signals.validate(now).is_err());

        let zero_k = TaskPayload::PathDiscovery {
            source: "a".into(),
            target: "b".into(),
            max_degree: None,
            k: Some(0),
        };
        assert!(zero_k.validate(now).is_err());
    }

    #[test]
    fn payload_json_shape() {
        let json = serde_json::json!({
            "type": "path_discovery",
            "source": "alice",
            "target": "acme"
        });
        let payload: TaskPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.kind(), "path_discovery");
    }
}
