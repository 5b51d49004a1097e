use std::time::Duration;

use pathweave_core::{PathweaveError, TaskId};
use pathweave_resource::SampleError;
use thiserror::Error;

use crate::task::CancelReason;

/// Why one handler attempt did not produce a result.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Graph(#[from] PathweaveError),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TaskError {
    /// Transient failures and timeouts are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Graph(e) => e.is_retryable(),
            TaskError::Timeout(_) => true,
            TaskError::Panicked(_) | TaskError::Encode(_) => false,
        }
    }

    /// Errors that end the task as Cancelled rather than Failed.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            TaskError::Graph(PathweaveError::FeatureDisabled { feature, level }) => {
                Some(CancelReason::FeatureDisabled {
                    feature: *feature,
                    level: *level,
                })
            }
            TaskError::Graph(PathweaveError::ResourceExhaustion { level }) => {
                Some(CancelReason::ResourceExhausted { level: *level })
            }
            TaskError::Graph(PathweaveError::Cancelled) => Some(CancelReason::Requested),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Graph(#[from] PathweaveError),

    #[error("Sampling failed: {0}")]
    Sampling(#[from] SampleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathweave_core::{Feature, PressureLevel};

    #[test]
    fn retry_classification() {
        assert!(TaskError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(TaskError::Graph(PathweaveError::TransientExecution("io".into())).is_retryable());
        assert!(!TaskError::Graph(PathweaveError::validation("bad")).is_retryable());
        assert!(!TaskError::Panicked("boom".into()).is_retryable());
    }

    #[test]
    fn disabled_feature_cancels() {
        let err = TaskError::Graph(PathweaveError::FeatureDisabled {
            feature: Feature::AdvancedAnalytics,
            level: PressureLevel::Critical,
        });
        assert_eq!(
            err.cancel_reason(),
            Some(CancelReason::FeatureDisabled {
                feature: Feature::AdvancedAnalytics,
                level: PressureLevel::Critical,
            })
        );
        assert!(!err.is_retryable());
        assert_eq!(TaskError::Timeout(Duration::ZERO).cancel_reason(), None);
    }
}
