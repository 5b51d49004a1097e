use thiserror::Error;

use crate::feature::{Feature, PressureLevel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathweaveError {
    /// Malformed input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Feature {feature} is disabled at {level} pressure")]
    FeatureDisabled {
        feature: Feature,
        level: PressureLevel,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Retry-eligible failure.
    #[error("Transient execution error: {0}")]
    TransientExecution(String),

    #[error("Resource exhaustion at {level} pressure")]
    ResourceExhaustion { level: PressureLevel },

    /// Cooperative cancellation observed mid-operation.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl PathweaveError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PathweaveError::Validation(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PathweaveError::TransientExecution(_) | PathweaveError::LockPoisoned(_)
        )
    }
}

pub type Result<T, E = PathweaveError> = std::result::Result<T, E>;
