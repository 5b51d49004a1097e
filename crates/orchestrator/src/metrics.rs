use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pathweave_core::PressureLevel;
use serde::Serialize;

use crate::task::{Priority, TaskStatus};

/// Attempt outcomes for one task kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    /// Handler attempts, retries included.
    pub attempts: u64,
    pub completed: u64,
    /// Attempts that failed and were queued again.
    pub retried: u64,
    /// Tasks that ran out of retries or failed permanently.
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    /// Handler time summed over all attempts.
    pub busy_time: Duration,
    pub longest_attempt: Duration,
    pub last_completed: Option<DateTime<Utc>>,
}

impl KindStats {
    pub fn mean_attempt_time(&self) -> Duration {
        match u32::try_from(self.attempts) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.busy_time / n,
            Err(_) => Duration::from_secs_f64(self.busy_time.as_secs_f64() / self.attempts as f64),
        }
    }

    fn absorb(&mut self, other: &KindStats) {
        self.attempts += other.attempts;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.timed_out += other.timed_out;
        self.busy_time += other.busy_time;
        self.longest_attempt = self.longest_attempt.max(other.longest_attempt);
        self.last_completed = self.last_completed.max(other.last_completed);
    }
}

/// Worker pool counters, exposed through system status.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    /// Keyed by [`TaskPayload::kind`](crate::task::TaskPayload::kind).
    pub by_kind: BTreeMap<String, KindStats>,
    /// Filled in when a status snapshot is taken.
    pub tasks_pending: HashMap<Priority, usize>,
    /// Busy workers over pool size.
    pub worker_utilization: f64,
    pub current_level: PressureLevel,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            by_kind: BTreeMap::new(),
            tasks_pending: HashMap::new(),
            worker_utilization: 0.0,
            current_level: PressureLevel::Normal,
        }
    }
}

impl SchedulerMetrics {
    /// Book one attempt of a `kind` task by the status the queue settled it
    /// into: Pending means it was queued for a retry.
    pub fn record_attempt(&mut self, kind: &str, settled: TaskStatus, elapsed: Duration) {
        let stats = self.by_kind.entry(kind.to_string()).or_default();
        stats.attempts += 1;
        stats.busy_time += elapsed;
        stats.longest_attempt = stats.longest_attempt.max(elapsed);
        match settled {
            TaskStatus::Completed => {
                stats.completed += 1;
                stats.last_completed = Some(Utc::now());
            }
            TaskStatus::Pending => stats.retried += 1,
            TaskStatus::Failed => stats.failed += 1,
            TaskStatus::Cancelled => stats.cancelled += 1,
            TaskStatus::Running => {}
        }
    }

    pub fn record_timeout(&mut self, kind: &str) {
        self.by_kind.entry(kind.to_string()).or_default().timed_out += 1;
    }

    /// Counters summed over every kind.
    pub fn totals(&self) -> KindStats {
        let mut total = KindStats::default();
        for stats in self.by_kind.values() {
            total.absorb(stats);
        }
        total
    }
}
