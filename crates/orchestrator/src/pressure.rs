//! Sampler loop and the queue-side effects of resource pressure.

use std::sync::Arc;

use pathweave_compute::TenantGraphs;
use pathweave_core::{FeatureStatus, PressureLevel};
use pathweave_resource::{
    ComplianceLedger, FeatureFlagRegistry, LevelTransition, ResourceSampler, SampleError,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::WorkflowQueue;
use crate::task::CancelReason;

pub(crate) struct PressureMonitor {
    pub(crate) sampler: Arc<ResourceSampler>,
    pub(crate) registry: Arc<FeatureFlagRegistry>,
    pub(crate) ledger: Arc<ComplianceLedger>,
    pub(crate) queue: Arc<WorkflowQueue>,
    pub(crate) graphs: Arc<TenantGraphs>,
}

impl PressureMonitor {
    /// One sampler tick: sample, reclassify, enforce.
    pub(crate) fn tick(&self) -> Result<LevelTransition, SampleError> {
        let snapshot = match self.sampler.sample() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.ledger
                    .record_sampling_failure(self.registry.level(), &e.to_string());
                return Err(e);
            }
        };

        let transition = self.registry.observe(&snapshot);
        self.ledger.record_sample(transition.to);
        self.ledger.record_transition(&transition, snapshot.timestamp);
        if transition.level_changed() {
            let from = transition.from;
            let to = transition.to;
            if transition.escalated() {
                warn!(%from, %to, cpu = snapshot.cpu_percent, memory = snapshot.memory_percent, "resource pressure escalated");
            } else {
                info!(%from, %to, "resource pressure relaxed");
            }
        }
        self.enforce(&transition);
        Ok(transition)
    }

    fn enforce(&self, transition: &LevelTransition) {
        let level = transition.to;
        if level < PressureLevel::Critical {
            return;
        }

        let drained = self.queue.drain_disabled(&self.registry);
        let registry = &self.registry;
        let mut cancelled = self.queue.cancel_running_where(|task| {
            let feature = task.payload.feature();
            (registry.status(feature) == FeatureStatus::Disabled)
                .then_some(CancelReason::FeatureDisabled { feature, level })
        });

        if level == PressureLevel::Emergency {
            cancelled += self
                .queue
                .cancel_running_where(|_| Some(CancelReason::ResourceExhausted { level }));
            if transition.from < PressureLevel::Emergency {
                if let Err(e) = self.graphs.reclaim() {
                    error!(error = %e, "graph reclamation failed");
                }
                self.queue.purge_finished();
            }
        }

        self.ledger.record_drained(drained);
        self.ledger.record_cancelled(cancelled);
        if drained + cancelled > 0 {
            warn!(%level, drained, cancelled, "degradation enforced");
        }
    }

    /// Tick on the sampling interval until `shutdown`. Failures stretch the
    /// next delay via the sampler's backoff.
    pub(crate) async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.sampler.interval();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?interval, "sampler loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.tick().is_err() {
                let extra = self.sampler.next_delay().saturating_sub(interval);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(extra) => {}
                }
            }
        }
        debug!("sampler loop stopped");
    }
}
