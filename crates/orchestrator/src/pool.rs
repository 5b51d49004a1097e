//! Worker pool: tokio tasks pulling leases from the [`WorkflowQueue`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use pathweave_core::config::OrchestratorConfig;
use pathweave_resource::FeatureFlagRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::handler::TaskHandler;
use crate::metrics::SchedulerMetrics;
use crate::queue::{Lease, Settlement, WorkflowQueue};
use crate::task::TaskStatus;

pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<WorkflowQueue>,
    pub(crate) registry: Arc<FeatureFlagRegistry>,
    pub(crate) handler: Arc<dyn TaskHandler>,
    pub(crate) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) active: Arc<AtomicUsize>,
    pub(crate) shutdown: CancellationToken,
}

pub(crate) fn spawn_workers(ctx: Arc<WorkerContext>) -> Vec<JoinHandle<()>> {
    info!(workers = ctx.config.worker_count, "starting worker pool");
    (0..ctx.config.worker_count)
        .map(|worker| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.worker_loop(worker).await })
        })
        .collect()
}

impl WorkerContext {
    async fn worker_loop(&self, worker: usize) {
        debug!(worker, "worker started");
        while !self.shutdown.is_cancelled() {
            match self.queue.try_dequeue(&self.registry) {
                Some(lease) => self.run(worker, lease).await,
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.queue.wait(self.config.dequeue_wait()) => {}
                    }
                }
            }
        }
        debug!(worker, "worker stopped");
    }

    async fn run(&self, worker: usize, lease: Lease) {
        let Lease { task, attempt, token } = lease;
        let id = task.id;
        let kind = task.payload.kind();
        let timeout = self.config.handler_timeout();
        debug!(worker, task = %id, kind, attempt, "attempt started");

        self.active.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        // a separate task so handler panics surface as JoinError
        let handler = Arc::clone(&self.handler);
        let handler_token = token.clone();
        let mut join = tokio::spawn(async move { handler.handle(&task, handler_token).await });
        let mut timed_out = false;
        let result = match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(TaskError::Panicked(e.to_string())),
            Err(_) => {
                token.cancel();
                join.abort();
                timed_out = true;
                Err(TaskError::Timeout(timeout))
            }
        };
        let elapsed = started.elapsed();
        self.active.fetch_sub(1, Ordering::Relaxed);

        let settlement = match result {
            Ok(value) => Settlement::Completed(value),
            Err(e) => {
                if let Some(reason) = e.cancel_reason() {
                    Settlement::Cancelled(Some(reason))
                } else if e.is_retryable() && attempt <= self.config.max_retries {
                    let after = self.config.backoff_for(attempt);
                    warn!(task = %id, kind, attempt, error = %e, retry_in = ?after, "attempt failed, retrying");
                    Settlement::Retry {
                        error: e.to_string(),
                        after,
                    }
                } else {
                    Settlement::Failed(e.to_string())
                }
            }
        };

        // metrics lock first, so a settled status is never visible
        // before its attempt is counted
        let settled = match self.metrics.write() {
            Ok(mut m) => {
                let settled = self.queue.settle(id, settlement);
                if let Some(status) = settled {
                    m.record_attempt(kind, status, elapsed);
                }
                if timed_out {
                    m.record_timeout(kind);
                }
                settled
            }
            Err(_) => self.queue.settle(id, settlement),
        };

        match settled {
            Some(TaskStatus::Completed) => {
                debug!(worker, task = %id, kind, ?elapsed, "task completed");
            }
            Some(TaskStatus::Failed) => {
                error!(task = %id, kind, attempts = attempt, "task failed");
            }
            Some(TaskStatus::Cancelled) => {
                info!(task = %id, kind, "task cancelled");
            }
            _ => {}
        }
    }
}
