//! Resource-aware workflow orchestration over the pathweave graph engine.
//!
//! [`Orchestrator`] wires a priority [`WorkflowQueue`] with dependency
//! gating, a tokio worker pool dispatching to a [`TaskHandler`], and a
//! sampler loop feeding the feature-flag registry.

pub mod error;
pub mod handler;
pub mod metrics;
pub mod orchestrator;
mod pool;
mod pressure;
pub mod queue;
pub mod task;

pub use error::{OrchestratorError, TaskError};
pub use handler::{GraphTaskHandler, TaskHandler};
pub use metrics::{KindStats, SchedulerMetrics};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SystemStatus};
pub use queue::{Lease, Settlement, WorkflowQueue};
pub use task::{CancelReason, Priority, TaskPayload, TaskRecord, TaskStatus, WorkflowTask};
